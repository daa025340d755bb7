//! Playback exclusivity
//!
//! One registry is shared by every player in a UI context. A recording can be
//! open in at most one player at a time; the player holds a [`PlaybackLease`]
//! for as long as its decoder is open.

use crate::utils::{CallError, CallResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Tracks which recordings are currently open
#[derive(Debug, Clone, Default)]
pub struct PlaybackRegistry {
    open: Arc<Mutex<HashSet<String>>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `recording_id`. Fails if another player already holds it.
    pub fn acquire(&self, recording_id: &str) -> CallResult<PlaybackLease> {
        let mut open = self.open.lock();
        if !open.insert(recording_id.to_string()) {
            return Err(CallError::ResourceUnavailable(format!(
                "recording {} is already open in another player",
                recording_id
            )));
        }

        Ok(PlaybackLease {
            recording_id: recording_id.to_string(),
            open: Arc::clone(&self.open),
        })
    }

    pub fn is_open(&self, recording_id: &str) -> bool {
        self.open.lock().contains(recording_id)
    }

    /// Number of recordings currently open
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

/// Claim on an open recording, released on drop
#[derive(Debug)]
pub struct PlaybackLease {
    recording_id: String,
    open: Arc<Mutex<HashSet<String>>>,
}

impl PlaybackLease {
    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }
}

impl Drop for PlaybackLease {
    fn drop(&mut self) {
        self.open.lock().remove(&self.recording_id);
    }
}
