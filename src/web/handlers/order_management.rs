//! # Order Management Handlers
//!
//! Order creation, queue access, manual status changes and rule management.

use serde_json::Value;
use tracing::debug;

use super::{decode, to_data};
use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use crate::web::errors::ApiResult;
use crate::web::requests::OrderManagementRequest;
use crate::web::state::AppState;

pub async fn handle<S: OrderStore + TaskQueue>(state: &AppState<S>, body: &[u8]) -> ApiResult<Value> {
    let request: OrderManagementRequest = decode(body)?;
    debug!(?request, "order-management request");
    let coordinator = state.coordinator();

    match request {
        OrderManagementRequest::CreateOrder(new_order) => {
            to_data(&coordinator.create_order(new_order).await?)
        }
        OrderManagementRequest::CreateOrderQueueEntry { order_id } => {
            to_data(&coordinator.queue().create_entry(order_id).await?)
        }
        OrderManagementRequest::GetProcessingQueue(filter) => {
            to_data(&coordinator.queue().list(&filter).await?)
        }
        OrderManagementRequest::UpdateOrderStatus(update) => {
            to_data(&coordinator.update_order_status(update).await?)
        }
        OrderManagementRequest::GetOrderAnalytics { order_id } => {
            to_data(&coordinator.analytics().get_or_calculate(order_id).await?)
        }
        OrderManagementRequest::ProcessAutomationRules { order_id } => {
            to_data(&coordinator.rules().process(order_id).await?)
        }
        OrderManagementRequest::CreateAutomationRule(new_rule) => {
            to_data(&coordinator.rules().create_rule(new_rule).await?)
        }
    }
}
