//! # Analytics Handlers
//!
//! Per-order metrics and the read-only dashboard rollups.

use serde_json::Value;

use super::{decode, to_data};
use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use crate::web::errors::ApiResult;
use crate::web::requests::AnalyticsRequest;
use crate::web::state::AppState;

pub async fn handle<S: OrderStore + TaskQueue>(state: &AppState<S>, body: &[u8]) -> ApiResult<Value> {
    let request: AnalyticsRequest = decode(body)?;
    let analytics = state.coordinator().analytics();

    match request {
        AnalyticsRequest::CalculateOrderMetrics { order_id } => {
            to_data(&analytics.calculate(order_id).await?)
        }
        AnalyticsRequest::GetEfficiencyDashboard { days } => {
            to_data(&analytics.efficiency_dashboard(days).await?)
        }
        AnalyticsRequest::ProcessorPerformance { days } => {
            to_data(&analytics.processor_performance(days).await?)
        }
        AnalyticsRequest::BottleneckAnalysis { days } => {
            to_data(&analytics.bottleneck_analysis(days).await?)
        }
        AnalyticsRequest::SlaCompliance { days } => {
            to_data(&analytics.sla_compliance(days).await?)
        }
        AnalyticsRequest::RealTimeMetrics => to_data(&analytics.real_time_metrics().await?),
    }
}
