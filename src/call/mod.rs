//! Call session module
//!
//! This module implements the live-call side of the core:
//! - CallStatus state machine and the CallSession data model
//! - MediaStream/MediaTrack handles shared with the capture and transport layers
//! - CallSessionController to drive one session through its lifecycle

pub mod controller;
pub mod media;
pub mod state;

pub use controller::{CallEvent, CallSessionController, CallSetup};
pub use media::{MediaStream, MediaStreamPair, MediaTrack, TrackError, TrackKind, TrackState};
pub use state::{CallKind, CallSession, CallStatus, Participant};
