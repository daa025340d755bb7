//! Recording persistence contract
//!
//! Finalized recordings are handed to a [`RecordingStore`]; stored recordings
//! come back from it for playback.

use super::artifact::CallRecording;
use crate::utils::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage for finalized call recordings
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Store a new recording
    async fn save(&self, recording: CallRecording) -> Result<(), StoreError>;

    /// Fetch a recording by id
    async fn get(&self, id: &str) -> Result<CallRecording, StoreError>;

    /// All recordings, newest first
    async fn list(&self) -> Result<Vec<CallRecording>, StoreError>;

    /// Remove a recording
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Process-local recording store
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordingStore {
    recordings: Arc<RwLock<HashMap<String, CallRecording>>>,
}

impl InMemoryRecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.recordings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.read().is_empty()
    }
}

#[async_trait]
impl RecordingStore for InMemoryRecordingStore {
    async fn save(&self, recording: CallRecording) -> Result<(), StoreError> {
        let mut recordings = self.recordings.write();
        if recordings.contains_key(recording.id()) {
            return Err(StoreError::Duplicate(recording.id().to_string()));
        }

        tracing::debug!(
            "Stored recording {} ({} bytes)",
            recording.id(),
            recording.size()
        );
        recordings.insert(recording.id().to_string(), recording);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<CallRecording, StoreError> {
        self.recordings
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<CallRecording>, StoreError> {
        let mut all: Vec<CallRecording> = self.recordings.read().values().cloned().collect();
        all.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.recordings
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
