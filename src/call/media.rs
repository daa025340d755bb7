//! Media streams and tracks
//!
//! Streams are owned by the capture and transport layers and shared as
//! `Arc<MediaStream>`. Tracks use atomics so a borrowed stream can be muted or
//! disabled without exclusive access.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ready state of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    /// The source is gone (device revoked, peer left)
    Ended,
}

/// Track-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("track {0} has ended")]
    Ended(String),

    #[error("stream {stream} has no {kind:?} track")]
    Missing { stream: String, kind: TrackKind },
}

/// A single audio or video component of a stream
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    ended: AtomicBool,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TrackState {
        if self.ended.load(Ordering::Acquire) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    /// Enable or disable the track. A disabled track stays attached to its
    /// stream and can be re-enabled without renegotiation.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), TrackError> {
        if self.state() == TrackState::Ended {
            return Err(TrackError::Ended(self.id.clone()));
        }
        self.enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    /// Permanently stop the track. Called by the owning collaborator.
    pub fn stop(&self) {
        self.ended.store(true, Ordering::Release);
    }
}

/// A collection of tracks from one source
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Stream with one audio track
    pub fn audio(id: impl Into<String>) -> Self {
        let id = id.into();
        let audio = MediaTrack::new(format!("{}-audio", id), TrackKind::Audio);
        Self::new(id, vec![audio])
    }

    /// Stream with one audio and one video track
    pub fn audio_video(id: impl Into<String>) -> Self {
        let id = id.into();
        let audio = MediaTrack::new(format!("{}-audio", id), TrackKind::Audio);
        let video = MediaTrack::new(format!("{}-video", id), TrackKind::Video);
        Self::new(id, vec![audio, video])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    /// Enable or disable every track of `kind`.
    ///
    /// Every track is attempted; the first failure is returned. A stream
    /// without tracks of `kind` is an error.
    pub fn set_tracks_enabled(
        &self,
        kind: TrackKind,
        enabled: bool,
    ) -> Result<usize, TrackError> {
        let mut updated = 0;
        let mut found = false;
        let mut first_error = None;

        for track in self.tracks_of(kind) {
            found = true;
            match track.set_enabled(enabled) {
                Ok(()) => updated += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None if !found => Err(TrackError::Missing {
                stream: self.id.clone(),
                kind,
            }),
            None => Ok(updated),
        }
    }
}

/// Local and remote streams of a connected call
#[derive(Debug, Clone)]
pub struct MediaStreamPair {
    pub local: Arc<MediaStream>,
    pub remote: Arc<MediaStream>,
}

impl MediaStreamPair {
    pub fn new(local: Arc<MediaStream>, remote: Arc<MediaStream>) -> Self {
        Self { local, remote }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_keeps_track_attached() {
        let stream = MediaStream::audio_video("local");

        assert_eq!(stream.set_tracks_enabled(TrackKind::Video, false), Ok(1));
        assert_eq!(stream.tracks().len(), 2);
        assert!(!stream.tracks_of(TrackKind::Video).all(|t| t.is_enabled()));
        assert!(stream.tracks_of(TrackKind::Audio).all(|t| t.is_enabled()));

        assert_eq!(stream.set_tracks_enabled(TrackKind::Video, true), Ok(1));
        assert!(stream.tracks_of(TrackKind::Video).all(|t| t.is_enabled()));
    }

    #[test]
    fn test_ended_track_rejects_changes() {
        let stream = MediaStream::audio("local");
        for track in stream.tracks() {
            track.stop();
        }

        assert_eq!(
            stream.set_tracks_enabled(TrackKind::Audio, false),
            Err(TrackError::Ended("local-audio".to_string()))
        );
        assert!(stream.tracks()[0].is_enabled());
    }

    #[test]
    fn test_missing_kind_is_an_error() {
        let stream = MediaStream::audio("mic");

        assert_eq!(
            stream.set_tracks_enabled(TrackKind::Video, false),
            Err(TrackError::Missing {
                stream: "mic".to_string(),
                kind: TrackKind::Video,
            })
        );
        assert_eq!(stream.set_tracks_enabled(TrackKind::Audio, false), Ok(1));
    }
}
