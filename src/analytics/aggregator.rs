//! # Order Metrics
//!
//! Stage timings, efficiency and SLA status derived from the status history.
//! The history is the only input, so recomputing on an unchanged history
//! yields the same row (apart from `calculated_at`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::SlaConfig;
use crate::constants::sla::{MAX_OVERRUN_PENALTY, RUSH_BONUS_RATIO, RUSH_EFFICIENCY_BONUS};
use crate::database::OrderStore;
use crate::error::Result;
use crate::models::{
    BottleneckStage, Order, OrderStatus, PriorityLevel, ProcessingAnalytics, StageTimings,
    StatusHistoryEntry,
};

/// The stage field a pair of consecutive statuses contributes to.
fn stage_slot(timings: &mut StageTimings, from: OrderStatus, to: OrderStatus) -> Option<&mut i64> {
    use OrderStatus::*;
    match (from, to) {
        (PaymentConfirmed, Processing) => Some(&mut timings.payment_to_processing),
        (Processing, InProduction) => Some(&mut timings.processing_to_production),
        (InProduction, QualityCheck) => Some(&mut timings.production_to_quality),
        (QualityCheck, Packaging) | (Packaging, Shipped) | (QualityCheck, Shipped) => {
            Some(&mut timings.quality_to_shipping)
        }
        (Shipped, Delivered) => Some(&mut timings.shipping_to_delivery),
        _ => None,
    }
}

fn chronological(history: &[StatusHistoryEntry]) -> Vec<&StatusHistoryEntry> {
    let mut entries: Vec<&StatusHistoryEntry> = history.iter().collect();
    // Stable: equal timestamps keep insertion order
    entries.sort_by_key(|entry| entry.created_at);
    entries
}

/// Minutes per stage. Pairs that are not a stage boundary are ignored.
pub fn compute_stage_timings(history: &[StatusHistoryEntry]) -> StageTimings {
    let entries = chronological(history);
    let mut timings = StageTimings::default();
    for pair in entries.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if let Some(slot) = stage_slot(&mut timings, a.new_status, b.new_status) {
            *slot += (b.created_at - a.created_at).num_minutes();
        }
    }
    timings
}

/// Minutes between the first and last history entries.
pub fn total_fulfillment_minutes(history: &[StatusHistoryEntry]) -> i64 {
    let entries = chronological(history);
    match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (last.created_at - first.created_at).num_minutes(),
        _ => 0,
    }
}

/// Rush first, then high/urgent priority, then everything else.
pub fn sla_target(order: &Order, sla: &SlaConfig) -> i64 {
    if order.rush_order {
        sla.rush_minutes
    } else if matches!(order.priority_level, PriorityLevel::High | PriorityLevel::Urgent) {
        sla.high_priority_minutes
    } else {
        sla.standard_minutes
    }
}

pub fn efficiency_score(total_minutes: i64, target_minutes: i64, rush_order: bool) -> f64 {
    let mut score = 100.0;
    if target_minutes <= 0 {
        return score;
    }
    let (total, target) = (total_minutes as f64, target_minutes as f64);
    if total > target {
        let overrun_pct = (total - target) / target * 100.0;
        score -= overrun_pct.min(MAX_OVERRUN_PENALTY);
    }
    if rush_order && total < target * RUSH_BONUS_RATIO {
        score += RUSH_EFFICIENCY_BONUS;
    }
    score.clamp(0.0, 100.0)
}

/// Stage with the longest duration; ties go to the earlier stage.
pub fn identify_bottleneck(timings: &StageTimings) -> BottleneckStage {
    let mut stages = timings.by_stage().into_iter();
    let (mut best, mut best_minutes) = stages
        .next()
        .unwrap_or((BottleneckStage::PaymentProcessing, 0));
    for (stage, minutes) in stages {
        if minutes > best_minutes {
            best = stage;
            best_minutes = minutes;
        }
    }
    best
}

/// Full analytics row for an order from its history.
pub fn compute_order_metrics(
    order: &Order,
    history: &[StatusHistoryEntry],
    sla: &SlaConfig,
    assigned_to: Option<String>,
    now: DateTime<Utc>,
) -> ProcessingAnalytics {
    let stage_timings = compute_stage_timings(history);
    let total = total_fulfillment_minutes(history);
    let target = sla_target(order, sla);

    ProcessingAnalytics {
        order_id: order.id,
        stage_timings,
        total_fulfillment_minutes: total,
        efficiency_score: efficiency_score(total, target, order.rush_order),
        bottleneck_stage: identify_bottleneck(&stage_timings),
        sla_target_minutes: target,
        sla_violated: total > target,
        assigned_to,
        completed: order.status == OrderStatus::Delivered,
        calculated_at: now,
    }
}

/// Persists per-order analytics and serves the dashboard rollups.
pub struct AnalyticsService<S: OrderStore> {
    pub(super) store: Arc<S>,
    sla: SlaConfig,
}

impl<S: OrderStore> AnalyticsService<S> {
    pub fn new(store: Arc<S>, sla: SlaConfig) -> Self {
        Self { store, sla }
    }

    pub fn sla(&self) -> &SlaConfig {
        &self.sla
    }

    #[instrument(skip(self))]
    pub async fn calculate(&self, order_id: Uuid) -> Result<ProcessingAnalytics> {
        let mut uow = self.store.begin().await?;
        let analytics = self.calculate_in(&mut uow, order_id).await?;
        self.store.commit(uow).await?;
        Ok(analytics)
    }

    /// Recompute and upsert the order's analytics row.
    pub async fn calculate_in(
        &self,
        uow: &mut S::UnitOfWork,
        order_id: Uuid,
    ) -> Result<ProcessingAnalytics> {
        let order = self.store.get_order_for_update(uow, order_id).await?;
        let history = self.store.status_history(uow, order_id).await?;

        let assigned_to = match self.store.active_queue_entry(uow, order_id).await? {
            Some(entry) if entry.assigned_to.is_some() => entry.assigned_to,
            _ => self
                .store
                .get_analytics(uow, order_id)
                .await?
                .and_then(|previous| previous.assigned_to),
        };

        let analytics = compute_order_metrics(&order, &history, &self.sla, assigned_to, Utc::now());
        self.store.upsert_analytics(uow, &analytics).await?;

        debug!(
            %order_id,
            total_minutes = analytics.total_fulfillment_minutes,
            efficiency = analytics.efficiency_score,
            bottleneck = %analytics.bottleneck_stage,
            sla_violated = analytics.sla_violated,
            "Order metrics recalculated"
        );
        Ok(analytics)
    }

    /// Stored analytics, computing them first if the order has none yet.
    pub async fn get_or_calculate(&self, order_id: Uuid) -> Result<ProcessingAnalytics> {
        let mut uow = self.store.begin().await?;
        // Locks the order and reports unknown ids as not found
        self.store.get_order_for_update(&mut uow, order_id).await?;
        let analytics = match self.store.get_analytics(&mut uow, order_id).await? {
            Some(existing) => existing,
            None => self.calculate_in(&mut uow, order_id).await?,
        };
        self.store.commit(uow).await?;
        Ok(analytics)
    }
}
