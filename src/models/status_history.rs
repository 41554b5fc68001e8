use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::OrderStatus;

/// One row of the append-only `order_status_history` ledger.
///
/// Entries are never updated or deleted; they are the only input to the
/// analytics stage timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    /// User id, or `"system"` for automated transitions
    pub actor: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        order_id: Uuid,
        previous_status: Option<OrderStatus>,
        new_status: OrderStatus,
        actor: impl Into<String>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            previous_status,
            new_status,
            actor: actor.into(),
            notes,
            created_at,
        }
    }
}
