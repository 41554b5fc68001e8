//! # Messaging Module
//!
//! Durable task queue used to defer auto-resolution attempts. On Postgres the
//! queue is pgmq; the in-memory store carries an equivalent with the same
//! visibility-timeout semantics. Producers enqueue through
//! [`crate::database::OrderStore::schedule_task`] so the message commits with
//! the unit of work that created it; consumers use [`TaskQueue`].

pub mod errors;
pub mod message;

use async_trait::async_trait;

pub use errors::{QueueError, QueueResult};
pub use message::{AutoResolutionTask, QueuedMessage};

/// Consumer side of a durable, visibility-timeout task queue
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Create the queue if it does not exist
    async fn ensure_queue(&self, queue_name: &str) -> QueueResult<()>;

    /// Read up to `limit` visible messages, hiding each for
    /// `visibility_timeout_seconds`
    async fn read_messages(
        &self,
        queue_name: &str,
        visibility_timeout_seconds: i32,
        limit: i32,
    ) -> QueueResult<Vec<QueuedMessage>>;

    /// Delete a processed message. Returns false if it was already gone.
    async fn delete_message(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool>;

    /// Move a message to the queue's archive
    async fn archive_message(&self, queue_name: &str, msg_id: i64) -> QueueResult<bool>;

    /// Messages currently in the queue, visible or not
    async fn queue_length(&self, queue_name: &str) -> QueueResult<i64>;
}
