//! # Messaging Error Types

use thiserror::Error;

/// Task queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },
}

impl QueueError {
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::MessageDeserialization {
            message: err.to_string(),
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
