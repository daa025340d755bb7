//! Recorded call artifacts
//!
//! A [`RecordingBuffer`] accumulates encoded audio while a call is being
//! recorded and is finalized into an immutable [`CallRecording`].

use crate::call::state::CallKind;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A finalized call recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecording {
    id: String,
    participants: Vec<String>,
    call_type: CallKind,
    timestamp: DateTime<Utc>,
    duration: u64,
    size: u64,
    #[serde(skip)]
    audio_data: Bytes,
}

impl CallRecording {
    /// Build a recording from stored parts. `size` is taken from `audio_data`.
    pub fn new(
        id: impl Into<String>,
        participants: Vec<String>,
        call_type: CallKind,
        timestamp: DateTime<Utc>,
        duration: u64,
        audio_data: Bytes,
    ) -> Self {
        Self {
            id: id.into(),
            participants,
            call_type,
            timestamp,
            duration,
            size: audio_data.len() as u64,
            audio_data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn call_type(&self) -> CallKind {
        self.call_type
    }

    /// When recording started
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Length in whole seconds
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Length of the audio data in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Recorded audio. Cloning the returned `Bytes` does not copy the data.
    pub fn audio_data(&self) -> &Bytes {
        &self.audio_data
    }
}

/// Audio accumulated for an in-progress recording
#[derive(Debug)]
pub struct RecordingBuffer {
    started_at: DateTime<Utc>,
    chunks: Vec<Bytes>,
    len: usize,
    max_bytes: Option<usize>,
    /// Set by the first dropped chunk; later chunks are rejected
    full: bool,
    dropped_chunks: usize,
}

impl RecordingBuffer {
    pub fn new(started_at: DateTime<Utc>, max_bytes: Option<usize>) -> Self {
        Self {
            started_at,
            chunks: Vec::new(),
            len: 0,
            max_bytes,
            full: false,
            dropped_chunks: 0,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Bytes buffered so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Chunks rejected because the buffer was full
    pub fn dropped_chunks(&self) -> usize {
        self.dropped_chunks
    }

    /// Whether the size cap has been reached
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Append a chunk in arrival order. Returns false if the chunk was dropped.
    ///
    /// Once a chunk would exceed the configured size cap the buffer is full
    /// and every later chunk is dropped too, so the recording stays a
    /// contiguous prefix of the stream.
    pub fn push(&mut self, chunk: Bytes) -> bool {
        if !self.full {
            if let Some(max) = self.max_bytes {
                if self.len.saturating_add(chunk.len()) > max {
                    self.full = true;
                    tracing::warn!(
                        "Recording buffer full ({} bytes), dropping further chunks",
                        self.len
                    );
                }
            }
        }
        if self.full {
            self.dropped_chunks += 1;
            return false;
        }

        self.len += chunk.len();
        self.chunks.push(chunk);
        true
    }

    /// Concatenate the buffered chunks into a finished recording
    pub fn finalize(
        self,
        participants: Vec<String>,
        call_type: CallKind,
        stopped_at: DateTime<Utc>,
    ) -> CallRecording {
        let duration = (stopped_at - self.started_at).num_seconds().max(0) as u64;

        let audio_data = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut data = BytesMut::with_capacity(self.len);
                for chunk in &self.chunks {
                    data.extend_from_slice(chunk);
                }
                data.freeze()
            }
        };

        CallRecording::new(
            Uuid::new_v4().to_string(),
            participants,
            call_type,
            self.started_at,
            duration,
            audio_data,
        )
    }
}
