//! # Web API Request Handlers
//!
//! One module per function endpoint. Each decodes its tagged request enum,
//! calls the matching service and returns the serialized result for the
//! `data` envelope.

pub mod analytics;
pub mod exceptions;
pub mod health;
pub mod order_management;
pub mod workflow;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::web::errors::{ApiError, ApiResult};

pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }
    Ok(serde_json::from_slice(body)?)
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|err| ApiError::Internal {
        code: "serialization_error",
        message: err.to_string(),
    })
}
