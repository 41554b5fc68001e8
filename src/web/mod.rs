//! # Web API
//!
//! Axum HTTP surface for the order lifecycle services.
//!
//! ## Routes
//!
//! - `POST /functions/v1/{function}` with `{ "action": ..., ...fields }` for
//!   `order-management`, `order-workflow-automation`, `processing-analytics`
//!   and `exception-handling`
//! - `GET /health`
//!
//! Success responses are `{ "data": ... }`; failures use the envelope in
//! [`errors::ApiError`].

pub mod errors;
pub mod handlers;
pub mod requests;
pub mod state;

use std::future::Future;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::database::OrderStore;
use crate::messaging::TaskQueue;
use errors::{ApiError, ApiResult};
pub use state::AppState;

pub const ORDER_MANAGEMENT: &str = "order-management";
pub const ORDER_WORKFLOW_AUTOMATION: &str = "order-workflow-automation";
pub const PROCESSING_ANALYTICS: &str = "processing-analytics";
pub const EXCEPTION_HANDLING: &str = "exception-handling";

/// Build the router with CORS and the configured body limit.
pub fn router<S: OrderStore + TaskQueue>(state: AppState<S>) -> Router {
    let max_body_bytes = state.config().server.max_body_bytes;
    Router::new()
        .route("/functions/v1/{function}", post(dispatch::<S>))
        .route("/health", get(handlers::health::health::<S>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(create_cors_layer())
        .with_state(state)
}

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ])
}

async fn dispatch<S: OrderStore + TaskQueue>(
    State(state): State<AppState<S>>,
    Path(function): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let data = match function.as_str() {
        ORDER_MANAGEMENT => handlers::order_management::handle(&state, &body).await,
        ORDER_WORKFLOW_AUTOMATION => handlers::workflow::handle(&state, &body).await,
        PROCESSING_ANALYTICS => handlers::analytics::handle(&state, &body).await,
        EXCEPTION_HANDLING => handlers::exceptions::handle(&state, &body).await,
        other => Err(ApiError::not_found(format!("unknown function: {other}"))),
    };

    match data {
        Ok(data) => Ok(Json(json!({ "data": data }))),
        Err(err) => {
            warn!(%function, code = err.code(), error = %err, "Function request failed");
            Err(err)
        }
    }
}

/// Serve until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Order ops API listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
