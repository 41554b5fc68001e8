//! # Queue Message Structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::QueueResult;

/// A message read from a task queue, mirroring a pgmq `message_record`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub msg_id: i64,
    /// Number of times the message has been read, including this read
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    /// Time at which the message becomes visible again if not deleted
    pub vt: DateTime<Utc>,
    pub message: serde_json::Value,
}

/// Deferred auto-resolution attempt for an exception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoResolutionTask {
    pub exception_id: Uuid,
    pub order_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

impl AutoResolutionTask {
    pub fn new(exception_id: Uuid, order_id: Uuid) -> Self {
        Self {
            exception_id,
            order_id,
            scheduled_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> QueueResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_message(message: &QueuedMessage) -> QueueResult<Self> {
        Ok(serde_json::from_value(message.message.clone())?)
    }
}
