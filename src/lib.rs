//! Team chat calls - call session core.
//!
//! This is the library crate behind the call and recording views of the team
//! chat client. It tracks a call through its lifecycle, drives mute/video and
//! recording on the shared media streams, and plays recorded calls back.

pub mod call;
pub mod clock;
pub mod commands;
pub mod config;
pub mod recording;
pub mod utils;

pub use call::{CallEvent, CallKind, CallSession, CallSessionController, CallSetup, CallStatus};
pub use config::{CallConfig, PlayerConfig};
pub use recording::{CallRecording, PlaybackRegistry, PlayerEvent, RecordingPlayer};
pub use utils::{CallError, CallResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging.
///
/// Honours `RUST_LOG`; defaults to debug output for this crate. Calling it
/// again after a subscriber is installed has no effect.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teamchat_calls=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Starting teamchat-calls v{}", env!("CARGO_PKG_VERSION"));
    }
}
