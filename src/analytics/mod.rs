//! # Processing Analytics
//!
//! Per-order fulfillment metrics computed from the status history, and the
//! dashboard rollups built on top of the stored rows.

pub mod aggregator;
pub mod dashboard;

pub use aggregator::{
    compute_order_metrics, compute_stage_timings, efficiency_score, identify_bottleneck,
    sla_target, total_fulfillment_minutes, AnalyticsService,
};
pub use dashboard::{
    BottleneckAnalysis, EfficiencyDashboard, ProcessorPerformance, RealTimeMetrics,
    SlaCompliance, SlaTargetSummary, StageSummary,
};
