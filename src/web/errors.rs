//! # Web API Error Types
//!
//! HTTP-facing errors and their conversion into the uniform envelope
//! `{ "error": { "code", "message" } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::OrderOpsError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    #[error("{message}")]
    Internal { code: &'static str, message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: "bad_request",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. } | Self::Conflict { code, .. } | Self::Internal { code, .. } => {
                code
            }
            Self::NotFound { .. } => "not_found",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl From<OrderOpsError> for ApiError {
    fn from(err: OrderOpsError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            OrderOpsError::Validation(_) => Self::BadRequest { code, message },
            OrderOpsError::OrderNotFound(_) | OrderOpsError::ExceptionNotFound(_) => {
                Self::NotFound { message }
            }
            OrderOpsError::InvalidTransition { .. } | OrderOpsError::Duplicate { .. } => {
                Self::Conflict { code, message }
            }
            OrderOpsError::Storage(_)
            | OrderOpsError::Queue(_)
            | OrderOpsError::Configuration(_) => {
                error!(code, error = %message, "Request failed downstream");
                Self::Internal { code, message }
            }
        }
    }
}

/// Malformed bodies and unknown actions
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest {
            code: "invalid_request",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StorageError;
    use uuid::Uuid;

    #[test]
    fn test_domain_errors_map_to_status_codes() {
        let cases = [
            (OrderOpsError::validation("bad"), StatusCode::BAD_REQUEST),
            (OrderOpsError::OrderNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                OrderOpsError::InvalidTransition {
                    from: "delivered".into(),
                    to: "processing".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                OrderOpsError::Duplicate {
                    entity: "party member",
                    key: "a@b.co".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                OrderOpsError::Storage(StorageError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_transition_conflict_keeps_domain_code() {
        let err = ApiError::from(OrderOpsError::InvalidTransition {
            from: "delivered".into(),
            to: "processing".into(),
        });
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(err.to_string(), "Invalid transition from delivered to processing");
    }
}
