//! Error types and handling
//!
//! Common error types used across the call core.

use crate::call::state::CallStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the call session controller and the recording player.
///
/// All variants are recoverable at the call site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl CallError {
    pub(crate) fn invalid(status: CallStatus, operation: &str) -> Self {
        Self::InvalidTransition(format!("cannot {} while call is {}", operation, status))
    }
}

/// Errors raised by recording stores
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("Recording already stored: {0}")]
    Duplicate(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Error response for frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CallError> for ErrorResponse {
    fn from(error: CallError) -> Self {
        let code = match &error {
            CallError::InvalidTransition(_) => "INVALID_TRANSITION",
            CallError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            CallError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<StoreError> for ErrorResponse {
    fn from(error: StoreError) -> Self {
        let code = match &error {
            StoreError::NotFound(_) => "RECORDING_NOT_FOUND",
            StoreError::Duplicate(_) => "RECORDING_DUPLICATE",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CallError
pub type CallResult<T> = Result<T, CallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let response: ErrorResponse = CallError::invalid(CallStatus::Ended, "toggle mute").into();
        assert_eq!(response.code, "INVALID_TRANSITION");
        assert_eq!(
            response.message,
            "Invalid transition: cannot toggle mute while call is ended"
        );

        let response: ErrorResponse =
            CallError::ResourceUnavailable("no local stream".to_string()).into();
        assert_eq!(response.code, "RESOURCE_UNAVAILABLE");

        let response: ErrorResponse = StoreError::NotFound("abc".to_string()).into();
        assert_eq!(response.code, "RECORDING_NOT_FOUND");
    }
}
