//! Call recording module
//!
//! This module implements the recorded-audio side of a call:
//! - RecordingBuffer accumulates audio while a call is recorded
//! - CallRecording is the finalized, immutable artifact
//! - RecordingPlayer plays a recording back, one open decoder at a time
//! - RecordingStore is the persistence contract for finished recordings

pub mod artifact;
pub mod player;
pub mod registry;
pub mod store;
pub mod wav;

pub use artifact::{CallRecording, RecordingBuffer};
pub use player::{PlaybackState, PlayerEvent, RecordingPlayer};
pub use registry::{PlaybackLease, PlaybackRegistry};
pub use store::{InMemoryRecordingStore, RecordingStore};
pub use wav::{encode_wav, wav_chunks, AudioInfo, WavDecoder};
