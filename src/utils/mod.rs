//! Shared utilities
//!
//! Error types and display formatting used across the call core.

pub mod error;
pub mod format;

pub use error::{CallError, CallResult, ConfigError, ErrorResponse, StoreError};
pub use format::{format_duration, format_file_size};
