use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PriorityLevel;

text_enum! {
    pub enum QueueStatus {
        Waiting => "waiting",
        Assigned => "assigned",
        Completed => "completed",
    }
}

impl QueueStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// Scheduling record for an order in the fulfillment pipeline.
/// Maps to `order_priority_queue`; at most one non-completed entry per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub priority_score: i32,
    pub priority_level: PriorityLevel,
    pub queue_status: QueueStatus,
    pub assigned_to: Option<String>,
    pub estimated_completion: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.queue_status = QueueStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn assign(&mut self, assignee: impl Into<String>, now: DateTime<Utc>) {
        self.assigned_to = Some(assignee.into());
        self.queue_status = QueueStatus::Assigned;
        self.updated_at = now;
    }
}

/// Filter for listing the processing queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueFilter {
    #[serde(default)]
    pub queue_status: Option<QueueStatus>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueueFilter {
    pub fn matches(&self, entry: &QueueEntry) -> bool {
        if let Some(status) = self.queue_status {
            if entry.queue_status != status {
                return false;
            }
        }
        if let Some(assignee) = &self.assigned_to {
            if entry.assigned_to.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Queue order: highest score first, then oldest first.
pub fn queue_ordering(a: &QueueEntry, b: &QueueEntry) -> std::cmp::Ordering {
    b.priority_score
        .cmp(&a.priority_score)
        .then_with(|| a.created_at.cmp(&b.created_at))
}
