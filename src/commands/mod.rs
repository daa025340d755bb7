//! Frontend command handlers
//!
//! This module contains the handlers the UI layer calls in response to user
//! input. Errors are returned as [`crate::utils::ErrorResponse`] for display.

pub mod call;
pub mod recording;

pub use call::CallState;
pub use recording::RecordingsState;
