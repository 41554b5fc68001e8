//! HTTP surface tests against a server bound to an ephemeral port.

mod common;

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::*;
use order_ops::web::{self, AppState};

/// Start a server on the in-memory store and return its base URL.
async fn spawn_server() -> String {
    let state = AppState::new(Arc::new(test_system()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = web::router(state);
    tokio::spawn(web::serve(listener, router, std::future::pending()));
    format!("http://{addr}")
}

async fn call(client: &Client, base: &str, function: &str, body: Value) -> (StatusCode, Value) {
    let response = client
        .post(format!("{base}/functions/v1/{function}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn create_order(client: &Client, base: &str, total: f64) -> String {
    let (status, body) = call(
        client,
        base,
        web::ORDER_MANAGEMENT,
        json!({
            "action": "create_order",
            "customer_id": "cust_web",
            "total_amount": total,
            "order_type": "standard",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "pending_payment");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_ok() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn test_order_payment_and_queue_round() {
    let base = spawn_server().await;
    let client = Client::new();
    let order_id = create_order(&client, &base, 6200.0).await;

    let (status, body) = call(
        &client,
        &base,
        web::ORDER_WORKFLOW_AUTOMATION,
        json!({
            "action": "process_payment_confirmation",
            "order_id": order_id,
            "payment_event_id": "pi_web_1",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["replayed"], false);
    assert_eq!(body["data"]["order"]["status"], "payment_confirmed");

    let (status, body) = call(
        &client,
        &base,
        web::ORDER_MANAGEMENT,
        json!({ "action": "get_processing_queue", "queue_status": "waiting" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["order_id"], order_id.as_str());
    assert_eq!(entries[0]["priority_level"], "high");

    let (status, body) = call(
        &client,
        &base,
        web::PROCESSING_ANALYTICS,
        json!({ "action": "get_efficiency_dashboard" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["period_days"], 30);
    assert_eq!(body["data"]["orders_analyzed"], 1);
}

#[tokio::test]
async fn test_exception_actions_over_http() {
    let base = spawn_server().await;
    let client = Client::new();
    let order_id = create_order(&client, &base, 180.0).await;

    let (status, body) = call(
        &client,
        &base,
        web::EXCEPTION_HANDLING,
        json!({
            "action": "create_exception",
            "order_id": order_id,
            "exception_type": "quality_issue",
            "severity": "medium",
            "description": "Loose stitching on lapel",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let exception_id = body["data"]["exception"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["exception"]["customer_impact_level"], "significant");

    let (status, body) = call(
        &client,
        &base,
        web::EXCEPTION_HANDLING,
        json!({
            "action": "escalate_exception",
            "exception_id": exception_id,
            "escalated_to": "manager_1",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "escalated");

    let (status, body) = call(
        &client,
        &base,
        web::EXCEPTION_HANDLING,
        json!({ "action": "list_order_exceptions", "order_id": order_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_unknown_function_is_not_found() {
    let base = spawn_server().await;
    let client = Client::new();
    let (status, body) = call(&client, &base, "inventory-sync", json!({ "action": "noop" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_malformed_requests_are_bad_requests() {
    let base = spawn_server().await;
    let client = Client::new();

    let (status, body) = call(
        &client,
        &base,
        web::ORDER_MANAGEMENT,
        json!({ "action": "launch_rockets" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");

    let response = client
        .post(format!("{base}/functions/v1/{}", web::ORDER_MANAGEMENT))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &client,
        &base,
        web::ORDER_MANAGEMENT,
        json!({ "action": "create_order", "customer_id": "cust_web", "total_amount": -5.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_illegal_transition_is_conflict() {
    let base = spawn_server().await;
    let client = Client::new();
    let order_id = create_order(&client, &base, 90.0).await;

    let (status, body) = call(
        &client,
        &base,
        web::ORDER_MANAGEMENT,
        json!({
            "action": "update_order_status",
            "order_id": order_id,
            "status": "delivered",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_transition");

    let (status, _) = call(
        &client,
        &base,
        web::ORDER_MANAGEMENT,
        json!({
            "action": "update_order_status",
            "order_id": uuid::Uuid::new_v4(),
            "status": "cancelled",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allows_client_headers() {
    let base = spawn_server().await;
    let response = Client::new()
        .request(Method::OPTIONS, format!("{base}/functions/v1/{}", web::ORDER_MANAGEMENT))
        .header("Origin", "https://kctmenswear.com")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "apikey, content-type")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let headers = response.headers();
    assert_eq!(
        headers
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let allowed = headers
        .get("access-control-allow-headers")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    for header in ["authorization", "x-client-info", "apikey", "content-type"] {
        assert!(allowed.contains(header), "missing {header} in {allowed}");
    }
}
