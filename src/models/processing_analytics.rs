use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Pipeline stages considered when naming an order's bottleneck.
    ///
    /// Declaration order is the tie-break order.
    pub enum BottleneckStage {
        PaymentProcessing => "payment_processing",
        Production => "production",
        QualityShipping => "quality_shipping",
        Delivery => "delivery",
    }
}

/// Minutes spent in each fulfillment stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub payment_to_processing: i64,
    pub processing_to_production: i64,
    pub production_to_quality: i64,
    pub quality_to_shipping: i64,
    pub shipping_to_delivery: i64,
}

impl StageTimings {
    /// Duration per bottleneck stage, in tie-break order.
    pub fn by_stage(&self) -> [(BottleneckStage, i64); 4] {
        [
            (BottleneckStage::PaymentProcessing, self.payment_to_processing),
            (
                BottleneckStage::Production,
                self.processing_to_production + self.production_to_quality,
            ),
            (BottleneckStage::QualityShipping, self.quality_to_shipping),
            (BottleneckStage::Delivery, self.shipping_to_delivery),
        ]
    }
}

/// Derived per-order fulfillment metrics.
/// Maps to `processing_analytics`; one row per order, recomputed in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingAnalytics {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub stage_timings: StageTimings,
    pub total_fulfillment_minutes: i64,
    pub efficiency_score: f64,
    pub bottleneck_stage: BottleneckStage,
    pub sla_target_minutes: i64,
    pub sla_violated: bool,
    pub assigned_to: Option<String>,
    /// Whether the order has reached delivery
    pub completed: bool,
    pub calculated_at: DateTime<Utc>,
}
