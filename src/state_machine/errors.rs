use thiserror::Error;
use uuid::Uuid;

use crate::database::StorageError;

/// Errors raised while applying an order or exception transition
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Exception not found: {0}")]
    ExceptionNotFound(Uuid),

    #[error("Persistence error: {0}")]
    Persistence(StorageError),
}

impl StateMachineError {
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<StorageError> for StateMachineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => Self::OrderNotFound(id),
            StorageError::ExceptionNotFound(id) => Self::ExceptionNotFound(id),
            other => Self::Persistence(other),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
