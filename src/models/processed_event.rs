use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Idempotency ledger entry for an external trigger (e.g. a payment webhook).
/// Maps to `processed_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub idempotency_key: String,
    pub action: String,
    pub order_id: Option<Uuid>,
    /// Response returned the first time; replayed for duplicates
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
