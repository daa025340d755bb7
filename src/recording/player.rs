//! Recording playback
//!
//! [`RecordingPlayer`] binds a recording's audio to a playback cursor. It owns
//! at most one open decoder, releases it on close, on re-open and on drop, and
//! reports its state after every operation.

use super::artifact::CallRecording;
use super::registry::{PlaybackLease, PlaybackRegistry};
use super::wav::WavDecoder;
use crate::config::PlayerConfig;
use crate::utils::{CallError, CallResult};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;

/// Events emitted by a player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Player state after an operation
    State(PlaybackState),
    /// Playback reached the end of the recording
    Finished { recording_id: String },
}

/// Player state as rendered by the recording view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub recording_id: Option<String>,
    /// Seconds from the start of the recording
    pub position: f64,
    pub duration: f64,
    pub is_playing: bool,
    /// Effective volume, 0 while muted
    pub volume: f32,
    pub is_muted: bool,
}

struct OpenRecording {
    recording: CallRecording,
    decoder: WavDecoder,
    _lease: PlaybackLease,
}

impl OpenRecording {
    /// Length the cursor can reach, never past the decodable audio
    fn playable_duration(&self) -> f64 {
        (self.recording.duration() as f64).min(self.decoder.info().duration_secs())
    }
}

/// Plays back one recording at a time
pub struct RecordingPlayer {
    registry: PlaybackRegistry,
    current: Option<OpenRecording>,
    position: f64,
    is_playing: bool,
    volume: f32,
    muted: bool,
    /// Set once the finished notification for the current arrival at the end was sent
    finished_notified: bool,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl RecordingPlayer {
    pub fn new(registry: PlaybackRegistry, config: &PlayerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            registry,
            current: None,
            position: 0.0,
            is_playing: false,
            volume: clamp_volume(config.initial_volume),
            muted: false,
            finished_notified: false,
            event_tx,
        }
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    /// Open `recording` for playback, closing whatever was open before.
    ///
    /// On failure nothing is left open.
    pub fn open(&mut self, recording: &CallRecording) -> CallResult<()> {
        self.release();

        let result = self.acquire(recording);
        if let Err(e) = &result {
            tracing::warn!("Failed to open recording {}: {}", recording.id(), e);
        }
        self.emit_state();
        result
    }

    fn acquire(&mut self, recording: &CallRecording) -> CallResult<()> {
        let lease = self.registry.acquire(recording.id())?;
        let decoder = WavDecoder::open(recording.audio_data().clone())?;

        tracing::info!(
            "Opened recording {} ({}s, {} bytes, {} Hz)",
            recording.id(),
            recording.duration(),
            recording.size(),
            decoder.info().sample_rate
        );

        self.current = Some(OpenRecording {
            recording: recording.clone(),
            decoder,
            _lease: lease,
        });
        Ok(())
    }

    /// Start playback. Does nothing when the cursor is already at the end.
    pub fn play(&mut self) -> CallResult<()> {
        let duration = match self.require_open() {
            Ok(open) => open.playable_duration(),
            Err(e) => {
                self.emit_state();
                return Err(e);
            }
        };

        if self.position < duration {
            self.is_playing = true;
            tracing::debug!("Playback started at {:.2}s", self.position);
        }
        self.emit_state();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
        self.emit_state();
    }

    pub fn toggle_playback(&mut self) -> CallResult<()> {
        if self.is_playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Move the cursor, clamped to the recording length
    pub fn seek(&mut self, position_secs: f64) -> CallResult<()> {
        let open = match self.require_open_mut() {
            Ok(open) => open,
            Err(e) => {
                self.emit_state();
                return Err(e);
            }
        };
        let duration = open.playable_duration();
        let target = if position_secs.is_nan() {
            0.0
        } else {
            position_secs.clamp(0.0, duration)
        };

        if let Err(e) = open.decoder.seek(target) {
            self.emit_state();
            return Err(e);
        }
        self.position = target;
        self.after_move(duration);
        self.emit_state();
        Ok(())
    }

    /// Advance playback by `elapsed` wall time and return the decoded samples
    /// for that span, scaled by the effective volume.
    ///
    /// Driven by the UI loop. Does nothing while paused. Audio that ends
    /// early or cannot be decoded further counts as the end of playback.
    pub fn advance(&mut self, elapsed: Duration) -> CallResult<Vec<i16>> {
        if !self.is_playing {
            return Ok(Vec::new());
        }

        let position = self.position;
        let gain = self.effective_volume();
        let open = self.require_open_mut()?;
        let duration = open.playable_duration();
        let target = (position + elapsed.as_secs_f64()).min(duration);

        let rate = open.decoder.info().sample_rate as f64;
        let frames = ((target - position) * rate).round() as usize;
        let (decoded, target) = match open.decoder.read_frames(frames) {
            Ok(decoded) => {
                let channels = open.decoder.info().channels.max(1) as usize;
                if decoded.len() < frames * channels {
                    (decoded, duration)
                } else {
                    (decoded, target)
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Decoding {} stopped at {:.2}s: {}",
                    open.recording.id(),
                    position,
                    e
                );
                (Vec::new(), duration)
            }
        };

        let samples: Vec<i16> = decoded
            .into_iter()
            .map(|s| (s as f32 * gain) as i16)
            .collect();

        self.position = target;
        self.after_move(duration);
        self.emit_state();
        Ok(samples)
    }

    /// Set the stored volume, clamped to 0.0-1.0. Does not change mute.
    pub fn set_volume(&mut self, level: f32) {
        self.volume = clamp_volume(level);
        self.emit_state();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.emit_state();
    }

    pub fn toggle_mute(&mut self) {
        self.set_muted(!self.muted);
    }

    /// Release the open recording. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.release();
        self.emit_state();
    }

    fn release(&mut self) {
        if let Some(open) = self.current.take() {
            tracing::info!("Closed recording {}", open.recording.id());
        }
        self.position = 0.0;
        self.is_playing = false;
        self.finished_notified = false;
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn recording(&self) -> Option<&CallRecording> {
        self.current.as_ref().map(|open| &open.recording)
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Stored volume, unaffected by mute
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            recording_id: self.recording().map(|r| r.id().to_string()),
            position: self.position,
            duration: self
                .current
                .as_ref()
                .map(|open| open.playable_duration())
                .unwrap_or(0.0),
            is_playing: self.is_playing,
            volume: self.effective_volume(),
            is_muted: self.muted,
        }
    }

    /// Pause and notify when the cursor arrives at the end
    fn after_move(&mut self, duration: f64) {
        if self.position < duration {
            self.finished_notified = false;
            return;
        }

        self.is_playing = false;
        if !self.finished_notified {
            self.finished_notified = true;
            if let Some(id) = self.recording().map(|r| r.id().to_string()) {
                tracing::debug!("Playback of {} finished", id);
                let _ = self.event_tx.send(PlayerEvent::Finished { recording_id: id });
            }
        }
    }

    fn require_open(&self) -> CallResult<&OpenRecording> {
        self.current
            .as_ref()
            .ok_or_else(|| CallError::ResourceUnavailable("no recording is open".to_string()))
    }

    fn require_open_mut(&mut self) -> CallResult<&mut OpenRecording> {
        self.current
            .as_mut()
            .ok_or_else(|| CallError::ResourceUnavailable("no recording is open".to_string()))
    }

    fn emit_state(&self) {
        let _ = self.event_tx.send(PlayerEvent::State(self.state()));
    }
}

impl Drop for RecordingPlayer {
    fn drop(&mut self) {
        self.release();
    }
}

fn clamp_volume(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}
