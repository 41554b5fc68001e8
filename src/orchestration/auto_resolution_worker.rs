//! # Auto-resolution Worker
//!
//! Polls the auto-resolution queue and hands each task to
//! [`ExceptionTracker::attempt_auto_resolution`].
//!
//! ## Message Handling
//!
//! - **Resolved / skipped**: the message is deleted
//! - **Failed attempt or transient error**: the message is left alone and
//!   becomes visible again once its visibility timeout expires
//! - **Exhausted** (`read_ct >= max_attempts`), malformed, or pointing at a
//!   missing exception: the message is archived

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::exception_tracker::{AutoResolutionOutcome, ExceptionTracker};
use crate::config::AutoResolutionConfig;
use crate::database::OrderStore;
use crate::error::OrderOpsError;
use crate::logging::log_error;
use crate::messaging::{AutoResolutionTask, QueueResult, QueuedMessage, TaskQueue};

/// Counters for one polling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerBatchStats {
    pub read: usize,
    pub resolved: usize,
    pub failed: usize,
    pub skipped: usize,
    pub archived: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Delete,
    Archive,
    Retry,
}

/// Delete or archive each handled message. A failure is counted and the rest
/// of the batch is still settled; the failed message reappears once its
/// visibility timeout expires.
async fn settle_batch<Q: TaskQueue + ?Sized>(
    queue: &Q,
    queue_name: &str,
    dispositions: Vec<(i64, Disposition)>,
    stats: &mut WorkerBatchStats,
) {
    for (msg_id, disposition) in dispositions {
        let settled = match disposition {
            Disposition::Delete => queue.delete_message(queue_name, msg_id).await.map(|_| ()),
            Disposition::Archive => queue
                .archive_message(queue_name, msg_id)
                .await
                .map(|_| stats.archived += 1),
            Disposition::Retry => Ok(()),
        };
        if let Err(err) = settled {
            warn!(msg_id, error = %err, "Could not settle auto-resolution message");
            stats.errors += 1;
        }
    }
}

pub struct AutoResolutionWorker<S: OrderStore + TaskQueue> {
    queue: Arc<S>,
    tracker: Arc<ExceptionTracker<S>>,
    config: AutoResolutionConfig,
}

impl<S: OrderStore + TaskQueue> AutoResolutionWorker<S> {
    pub fn new(
        queue: Arc<S>,
        tracker: Arc<ExceptionTracker<S>>,
        config: AutoResolutionConfig,
    ) -> Self {
        Self {
            queue,
            tracker,
            config,
        }
    }

    /// Read one batch and process every message in it.
    pub async fn process_batch(&self) -> QueueResult<WorkerBatchStats> {
        let queue_name = self.config.queue_name.as_str();
        let messages = self
            .queue
            .read_messages(
                queue_name,
                self.config.visibility_timeout_seconds,
                self.config.batch_size,
            )
            .await?;

        let mut stats = WorkerBatchStats {
            read: messages.len(),
            ..Default::default()
        };
        let mut dispositions = Vec::with_capacity(messages.len());
        for message in &messages {
            dispositions.push((message.msg_id, self.handle(message, &mut stats).await));
        }
        settle_batch(self.queue.as_ref(), queue_name, dispositions, &mut stats).await;

        if stats.read > 0 {
            debug!(queue = %queue_name, ?stats, "Auto-resolution batch processed");
        }
        Ok(stats)
    }

    async fn handle(&self, message: &QueuedMessage, stats: &mut WorkerBatchStats) -> Disposition {
        let exhausted = message.read_ct >= self.config.max_attempts;

        let task = match AutoResolutionTask::from_message(message) {
            Ok(task) => task,
            Err(err) => {
                warn!(msg_id = message.msg_id, error = %err, "Archiving malformed auto-resolution task");
                stats.errors += 1;
                return Disposition::Archive;
            }
        };

        match self.tracker.attempt_auto_resolution(task.exception_id).await {
            Ok(AutoResolutionOutcome::Resolved { .. }) => {
                stats.resolved += 1;
                Disposition::Delete
            }
            Ok(AutoResolutionOutcome::Skipped { reason, .. }) => {
                debug!(exception_id = %task.exception_id, %reason, "Auto-resolution skipped");
                stats.skipped += 1;
                Disposition::Delete
            }
            Ok(AutoResolutionOutcome::Failed { .. }) => {
                stats.failed += 1;
                if exhausted {
                    info!(
                        exception_id = %task.exception_id,
                        attempts = message.read_ct,
                        "Auto-resolution attempts exhausted"
                    );
                    Disposition::Archive
                } else {
                    Disposition::Retry
                }
            }
            Err(OrderOpsError::ExceptionNotFound(id)) => {
                warn!(exception_id = %id, "Auto-resolution task for unknown exception");
                stats.errors += 1;
                Disposition::Archive
            }
            Err(err) => {
                log_error(
                    "auto_resolution_worker",
                    "attempt_auto_resolution",
                    &err.to_string(),
                    Some(&task.exception_id.to_string()),
                );
                stats.errors += 1;
                if exhausted {
                    Disposition::Archive
                } else {
                    Disposition::Retry
                }
            }
        }
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Err(err) = self.queue.ensure_queue(&self.config.queue_name).await {
            error!(queue = %self.config.queue_name, error = %err, "Could not create auto-resolution queue");
            return;
        }
        info!(
            queue = %self.config.queue_name,
            poll_interval_ms = self.config.poll_interval_ms,
            "Auto-resolution worker started"
        );

        while !*shutdown.borrow() {
            if let Err(err) = self.process_batch().await {
                error!(queue = %self.config.queue_name, error = %err, "Auto-resolution batch failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.config.queue_name, "Auto-resolution worker stopped");
    }
}
