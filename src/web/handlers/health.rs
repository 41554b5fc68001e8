//! # Health Check Handler

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};

use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
    environment: String,
    version: &'static str,
    /// Pending auto-resolution tasks, visible or not
    auto_resolution_backlog: i64,
}

/// `GET /health`: reports ok when the store accepts a unit of work.
pub async fn health<S: OrderStore + TaskQueue>(
    State(state): State<AppState<S>>,
) -> Result<Json<HealthResponse>, ApiError> {
    debug!("Performing health check");
    let store = state.store();

    let probe = async {
        let uow = store.begin().await?;
        store.rollback(uow).await
    };
    if let Err(err) = probe.await {
        error!(error = %err, "Store health probe failed");
        return Err(ApiError::ServiceUnavailable);
    }

    let backlog = store
        .queue_length(&state.config().auto_resolution.queue_name)
        .await
        .unwrap_or_default();

    Ok(Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        environment: state.config().environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
        auto_resolution_backlog: backlog,
    }))
}
