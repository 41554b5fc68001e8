use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::database::StorageError;
use crate::messaging::QueueError;
use crate::state_machine::StateMachineError;

/// Top-level error for order-ops services
#[derive(Debug, Error)]
pub enum OrderOpsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Exception not found: {0}")]
    ExceptionNotFound(Uuid),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl OrderOpsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Stable machine-readable code used in the HTTP error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::OrderNotFound(_) | Self::ExceptionNotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Duplicate { .. } => "duplicate",
            Self::Storage(_) => "storage_error",
            Self::Queue(_) => "queue_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl From<StorageError> for OrderOpsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => Self::OrderNotFound(id),
            StorageError::ExceptionNotFound(id) => Self::ExceptionNotFound(id),
            StorageError::Duplicate { entity, key } => Self::Duplicate { entity, key },
            other => Self::Storage(other),
        }
    }
}

impl From<StateMachineError> for OrderOpsError {
    fn from(err: StateMachineError) -> Self {
        match err {
            StateMachineError::InvalidTransition { from, to } => {
                Self::InvalidTransition { from, to }
            }
            StateMachineError::OrderNotFound(id) => Self::OrderNotFound(id),
            StateMachineError::ExceptionNotFound(id) => Self::ExceptionNotFound(id),
            StateMachineError::Persistence(storage) => storage.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderOpsError>;
