//! Read-only rollups over stored analytics rows and the live queue.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::aggregator::AnalyticsService;
use crate::database::OrderStore;
use crate::error::{OrderOpsError, Result};
use crate::models::{
    BottleneckStage, ExceptionStatus, OrderStatus, PriorityLevel, ProcessingAnalytics,
    QueueFilter, QueueStatus,
};

/// Longest look-back window accepted by the dashboards
pub const MAX_DASHBOARD_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyDashboard {
    pub period_days: i64,
    pub orders_analyzed: usize,
    pub completed_orders: usize,
    pub average_efficiency: f64,
    pub average_fulfillment_minutes: f64,
    pub sla_violations: usize,
    pub sla_compliance_rate: f64,
    pub bottleneck_distribution: BTreeMap<BottleneckStage, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorPerformance {
    pub processor: String,
    pub orders_handled: usize,
    pub completed_orders: usize,
    pub average_efficiency: f64,
    pub average_fulfillment_minutes: f64,
    pub sla_violations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: BottleneckStage,
    /// Orders whose bottleneck is this stage
    pub bottleneck_count: usize,
    pub average_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BottleneckAnalysis {
    pub period_days: i64,
    pub orders_analyzed: usize,
    pub stages: Vec<StageSummary>,
    pub most_common_bottleneck: Option<BottleneckStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaTargetSummary {
    pub sla_target_minutes: i64,
    pub orders: usize,
    pub violated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaCompliance {
    pub period_days: i64,
    pub orders_analyzed: usize,
    pub within_sla: usize,
    pub violated: usize,
    pub compliance_rate: f64,
    pub by_target: Vec<SlaTargetSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealTimeMetrics {
    pub queue_waiting: usize,
    pub queue_assigned: usize,
    pub urgent_in_queue: usize,
    pub high_in_queue: usize,
    pub orders_by_status: BTreeMap<OrderStatus, usize>,
    pub open_exceptions: usize,
    pub escalated_exceptions: usize,
    pub generated_at: DateTime<Utc>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        round2(sum / count as f64)
    }
}

/// Share of rows within SLA, as a percentage. An empty window is fully compliant.
fn compliance_rate(rows: &[ProcessingAnalytics]) -> f64 {
    if rows.is_empty() {
        return 100.0;
    }
    let within = rows.iter().filter(|r| !r.sla_violated).count();
    round2(within as f64 / rows.len() as f64 * 100.0)
}

pub fn efficiency_dashboard(rows: &[ProcessingAnalytics], period_days: i64) -> EfficiencyDashboard {
    let mut bottleneck_distribution = BTreeMap::new();
    for row in rows {
        *bottleneck_distribution.entry(row.bottleneck_stage).or_insert(0) += 1;
    }

    EfficiencyDashboard {
        period_days,
        orders_analyzed: rows.len(),
        completed_orders: rows.iter().filter(|r| r.completed).count(),
        average_efficiency: average(rows.iter().map(|r| r.efficiency_score)),
        average_fulfillment_minutes: average(rows.iter().map(|r| r.total_fulfillment_minutes as f64)),
        sla_violations: rows.iter().filter(|r| r.sla_violated).count(),
        sla_compliance_rate: compliance_rate(rows),
        bottleneck_distribution,
    }
}

/// Per-processor rollup, best average efficiency first. Unassigned rows are skipped.
pub fn processor_performance(rows: &[ProcessingAnalytics]) -> Vec<ProcessorPerformance> {
    let mut by_processor: BTreeMap<&str, Vec<&ProcessingAnalytics>> = BTreeMap::new();
    for row in rows {
        if let Some(processor) = row.assigned_to.as_deref() {
            by_processor.entry(processor).or_default().push(row);
        }
    }

    let mut performance: Vec<ProcessorPerformance> = by_processor
        .into_iter()
        .map(|(processor, rows)| ProcessorPerformance {
            processor: processor.to_string(),
            orders_handled: rows.len(),
            completed_orders: rows.iter().filter(|r| r.completed).count(),
            average_efficiency: average(rows.iter().map(|r| r.efficiency_score)),
            average_fulfillment_minutes: average(
                rows.iter().map(|r| r.total_fulfillment_minutes as f64),
            ),
            sla_violations: rows.iter().filter(|r| r.sla_violated).count(),
        })
        .collect();

    // Stable sort keeps processor names alphabetical within equal efficiency
    performance.sort_by(|a, b| b.average_efficiency.total_cmp(&a.average_efficiency));
    performance
}

pub fn bottleneck_analysis(rows: &[ProcessingAnalytics], period_days: i64) -> BottleneckAnalysis {
    let stages: Vec<StageSummary> = BottleneckStage::ALL
        .iter()
        .map(|stage| StageSummary {
            stage: *stage,
            bottleneck_count: rows.iter().filter(|r| r.bottleneck_stage == *stage).count(),
            average_minutes: average(rows.iter().map(|r| {
                r.stage_timings
                    .by_stage()
                    .iter()
                    .find(|(s, _)| s == stage)
                    .map(|(_, minutes)| *minutes as f64)
                    .unwrap_or(0.0)
            })),
        })
        .collect();

    // First stage wins ties, matching the per-order bottleneck rule
    let most_common_bottleneck = stages
        .iter()
        .filter(|s| s.bottleneck_count > 0)
        .fold(None::<&StageSummary>, |best, s| match best {
            Some(b) if b.bottleneck_count >= s.bottleneck_count => Some(b),
            _ => Some(s),
        })
        .map(|s| s.stage);

    BottleneckAnalysis {
        period_days,
        orders_analyzed: rows.len(),
        stages,
        most_common_bottleneck,
    }
}

pub fn sla_compliance(rows: &[ProcessingAnalytics], period_days: i64) -> SlaCompliance {
    let mut by_target: BTreeMap<i64, SlaTargetSummary> = BTreeMap::new();
    for row in rows {
        let summary = by_target
            .entry(row.sla_target_minutes)
            .or_insert_with(|| SlaTargetSummary {
                sla_target_minutes: row.sla_target_minutes,
                orders: 0,
                violated: 0,
            });
        summary.orders += 1;
        if row.sla_violated {
            summary.violated += 1;
        }
    }

    let violated = rows.iter().filter(|r| r.sla_violated).count();
    SlaCompliance {
        period_days,
        orders_analyzed: rows.len(),
        within_sla: rows.len() - violated,
        violated,
        compliance_rate: compliance_rate(rows),
        by_target: by_target.into_values().collect(),
    }
}

fn validate_days(days: i64) -> Result<()> {
    if !(1..=MAX_DASHBOARD_DAYS).contains(&days) {
        return Err(OrderOpsError::validation(format!(
            "days must be between 1 and {MAX_DASHBOARD_DAYS}, got {days}"
        )));
    }
    Ok(())
}

impl<S: OrderStore> AnalyticsService<S> {
    async fn rows_since(&self, days: i64) -> Result<Vec<ProcessingAnalytics>> {
        validate_days(days)?;
        let since = Utc::now() - Duration::days(days);
        let mut uow = self.store.begin().await?;
        let rows = self.store.list_analytics(&mut uow, since).await?;
        self.store.rollback(uow).await?;
        Ok(rows)
    }

    pub async fn efficiency_dashboard(&self, days: i64) -> Result<EfficiencyDashboard> {
        let rows = self.rows_since(days).await?;
        Ok(efficiency_dashboard(&rows, days))
    }

    pub async fn processor_performance(&self, days: i64) -> Result<Vec<ProcessorPerformance>> {
        let rows = self.rows_since(days).await?;
        Ok(processor_performance(&rows))
    }

    pub async fn bottleneck_analysis(&self, days: i64) -> Result<BottleneckAnalysis> {
        let rows = self.rows_since(days).await?;
        Ok(bottleneck_analysis(&rows, days))
    }

    pub async fn sla_compliance(&self, days: i64) -> Result<SlaCompliance> {
        let rows = self.rows_since(days).await?;
        Ok(sla_compliance(&rows, days))
    }

    pub async fn real_time_metrics(&self) -> Result<RealTimeMetrics> {
        let mut uow = self.store.begin().await?;
        let active: Vec<_> = self
            .store
            .list_queue(&mut uow, &QueueFilter::default())
            .await?
            .into_iter()
            .filter(|entry| entry.queue_status.is_active())
            .collect();
        let orders = self.store.list_orders(&mut uow, None).await?;
        let exceptions = self.store.list_exceptions(&mut uow, None).await?;
        self.store.rollback(uow).await?;

        let mut orders_by_status = BTreeMap::new();
        for order in &orders {
            *orders_by_status.entry(order.status).or_insert(0) += 1;
        }

        Ok(RealTimeMetrics {
            queue_waiting: active
                .iter()
                .filter(|e| e.queue_status == QueueStatus::Waiting)
                .count(),
            queue_assigned: active
                .iter()
                .filter(|e| e.queue_status == QueueStatus::Assigned)
                .count(),
            urgent_in_queue: active
                .iter()
                .filter(|e| e.priority_level == PriorityLevel::Urgent)
                .count(),
            high_in_queue: active
                .iter()
                .filter(|e| e.priority_level == PriorityLevel::High)
                .count(),
            orders_by_status,
            open_exceptions: exceptions
                .iter()
                .filter(|e| matches!(e.status, ExceptionStatus::Open | ExceptionStatus::InProgress))
                .count(),
            escalated_exceptions: exceptions
                .iter()
                .filter(|e| e.status == ExceptionStatus::Escalated)
                .count(),
            generated_at: Utc::now(),
        })
    }
}
