//! # Exception Handlers

use serde_json::Value;

use super::{decode, to_data};
use crate::constants::SYSTEM_ACTOR;
use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use crate::web::errors::ApiResult;
use crate::web::requests::ExceptionActionRequest;
use crate::web::state::AppState;

pub async fn handle<S: OrderStore + TaskQueue>(state: &AppState<S>, body: &[u8]) -> ApiResult<Value> {
    let request: ExceptionActionRequest = decode(body)?;
    let coordinator = state.coordinator();
    let tracker = coordinator.tracker();

    match request {
        ExceptionActionRequest::CreateException(req) => {
            to_data(&coordinator.exception_handling(req).await?)
        }
        ExceptionActionRequest::AttemptAutoResolution { exception_id } => {
            to_data(&tracker.attempt_auto_resolution(exception_id).await?)
        }
        ExceptionActionRequest::StartExceptionWork { exception_id } => {
            to_data(&tracker.start_work(exception_id).await?)
        }
        ExceptionActionRequest::ResolveException {
            exception_id,
            resolution_notes,
            actor,
        } => {
            let actor = actor.as_deref().unwrap_or(SYSTEM_ACTOR);
            to_data(&tracker.resolve(exception_id, resolution_notes, actor).await?)
        }
        ExceptionActionRequest::EscalateException {
            exception_id,
            escalated_to,
        } => to_data(&tracker.escalate(exception_id, &escalated_to).await?),
        ExceptionActionRequest::ListOrderExceptions { order_id } => {
            to_data(&tracker.list_for_order(order_id).await?)
        }
    }
}
