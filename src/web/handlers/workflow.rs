//! # Workflow Automation Handlers

use serde_json::Value;
use tracing::debug;

use super::{decode, to_data};
use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use crate::web::errors::ApiResult;
use crate::web::requests::WorkflowRequest;
use crate::web::state::AppState;

pub async fn handle<S: OrderStore + TaskQueue>(state: &AppState<S>, body: &[u8]) -> ApiResult<Value> {
    let request: WorkflowRequest = decode(body)?;
    debug!(?request, "order-workflow-automation request");
    let coordinator = state.coordinator();

    match request {
        WorkflowRequest::ProcessPaymentConfirmation(req) => {
            to_data(&coordinator.process_payment_confirmation(req).await?)
        }
        WorkflowRequest::IntelligentOrderRouting(req) => {
            to_data(&coordinator.intelligent_order_routing(req).await?)
        }
        WorkflowRequest::BundleOrderProcessing(req) => {
            to_data(&coordinator.bundle_order_processing(req).await?)
        }
        WorkflowRequest::WeddingPartyCoordination(req) => {
            to_data(&coordinator.wedding_party_coordination(req).await?)
        }
        WorkflowRequest::ExceptionHandling(req) => {
            to_data(&coordinator.exception_handling(req).await?)
        }
        WorkflowRequest::QualityAssuranceWorkflow(req) => {
            to_data(&coordinator.quality_assurance_workflow(req).await?)
        }
    }
}
