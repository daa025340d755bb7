//! Call session controller
//!
//! Owns a call's lifecycle state and mediates every transition: status
//! changes, mute/video toggles on the local stream, and recording.

use super::media::{MediaStream, MediaStreamPair, TrackKind};
use super::state::{CallKind, CallSession, CallStatus, Participant};
use crate::clock::Clock;
use crate::config::CallConfig;
use crate::recording::{CallRecording, RecordingBuffer};
use crate::utils::{CallError, CallResult};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by a call session
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// Session state after an operation
    Snapshot(CallSession),
    /// Recording started
    RecordingStarted { call_id: String },
    /// A recording was finalized and handed to the caller
    RecordingFinalized {
        recording_id: String,
        duration: u64,
        size: u64,
    },
    /// Call ended
    Ended { elapsed_seconds: u64 },
}

/// Parameters for creating a session
#[derive(Debug, Clone)]
pub struct CallSetup {
    /// Session id; generated when absent
    pub id: Option<String>,
    pub kind: CallKind,
    pub initiator: Participant,
    pub participants: Vec<Participant>,
}

impl CallSetup {
    pub fn new(kind: CallKind, initiator: Participant, participants: Vec<Participant>) -> Self {
        Self {
            id: None,
            kind,
            initiator,
            participants,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Drives a single call session
pub struct CallSessionController {
    session: CallSession,

    /// Streams are owned by the capture and transport layers
    local: Option<Weak<MediaStream>>,
    remote: Option<Weak<MediaStream>>,

    /// Audio accumulated while recording
    recording: Option<RecordingBuffer>,

    /// Elapsed seconds captured when the call ended
    ended_elapsed: Option<u64>,

    /// Highest elapsed value reported while connected
    elapsed_high_water: AtomicU64,

    clock: Arc<dyn Clock>,
    config: CallConfig,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CallSessionController {
    /// Session for a call placed by the local user
    pub fn outgoing(setup: CallSetup, clock: Arc<dyn Clock>, config: CallConfig) -> Self {
        Self::new(setup, CallStatus::Calling, clock, config)
    }

    /// Session for a call received from a remote user, waiting to be answered
    pub fn incoming(setup: CallSetup, clock: Arc<dyn Clock>, config: CallConfig) -> Self {
        Self::new(setup, CallStatus::Ringing, clock, config)
    }

    fn new(
        setup: CallSetup,
        status: CallStatus,
        clock: Arc<dyn Clock>,
        config: CallConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let id = setup.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        tracing::info!(
            "Created {:?} call {} in status {} with {} participant(s)",
            setup.kind,
            id,
            status,
            setup.participants.len()
        );

        Self {
            session: CallSession::new(id, setup.kind, status, setup.initiator, setup.participants),
            local: None,
            remote: None,
            recording: None,
            ended_elapsed: None,
            elapsed_high_water: AtomicU64::new(0),
            clock,
            config,
            event_tx,
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn snapshot(&self) -> CallSession {
        self.session.clone()
    }

    pub fn status(&self) -> CallStatus {
        self.session.status
    }

    pub fn is_recording(&self) -> bool {
        self.session.recording
    }

    /// Bytes buffered by the active recording
    pub fn recorded_bytes(&self) -> usize {
        self.recording.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn local_stream(&self) -> Option<Arc<MediaStream>> {
        self.local.as_ref().and_then(Weak::upgrade)
    }

    pub fn remote_stream(&self) -> Option<Arc<MediaStream>> {
        self.remote.as_ref().and_then(Weak::upgrade)
    }

    /// The remote side has been notified of the call
    pub fn ring(&mut self) -> CallResult<()> {
        let result = self.transition(CallStatus::Ringing, "ring");
        self.emit_snapshot();
        result
    }

    /// Both media streams are active.
    ///
    /// The current mute and video intent is applied to the local tracks. If
    /// that fails the call still connects and the failure is returned.
    pub fn connect(&mut self, streams: &MediaStreamPair) -> CallResult<()> {
        if let Err(e) = self.transition(CallStatus::Connected, "connect") {
            self.emit_snapshot();
            return Err(e);
        }

        self.session.start_time = Some(self.clock.now());
        self.local = Some(Arc::downgrade(&streams.local));
        self.remote = Some(Arc::downgrade(&streams.remote));

        tracing::info!(
            "Call {} connected (local {}, remote {})",
            self.session.id,
            streams.local.id(),
            streams.remote.id()
        );

        let result = self.apply_local_intent();
        self.emit_snapshot();
        result
    }

    /// Attach the capture stream before the call connects, e.g. for a preview
    pub fn attach_local_stream(&mut self, local: &Arc<MediaStream>) -> CallResult<()> {
        if let Err(e) = self.ensure_active("attach local stream") {
            self.emit_snapshot();
            return Err(e);
        }

        self.local = Some(Arc::downgrade(local));
        tracing::debug!("Attached local stream {} to call {}", local.id(), self.session.id);

        let result = self.apply_local_intent();
        self.emit_snapshot();
        result
    }

    /// Flip `muted` and mute or unmute the local audio tracks.
    ///
    /// Without a usable local stream the flag still flips and
    /// `ResourceUnavailable` is returned.
    pub fn toggle_mute(&mut self) -> CallResult<()> {
        if let Err(e) = self.ensure_active("toggle mute") {
            self.emit_snapshot();
            return Err(e);
        }

        self.session.muted = !self.session.muted;
        tracing::debug!("Call {} muted: {}", self.session.id, self.session.muted);

        let result = self.set_local_tracks(TrackKind::Audio, !self.session.muted);
        self.emit_snapshot();
        result
    }

    /// Flip `video_enabled` and enable or disable the local video tracks.
    ///
    /// Rejected for voice calls. Disabled tracks stay attached.
    pub fn toggle_video(&mut self) -> CallResult<()> {
        let check = self.ensure_active("toggle video").and_then(|_| {
            if self.session.kind == CallKind::Voice {
                Err(CallError::InvalidTransition(
                    "cannot toggle video on a voice call".to_string(),
                ))
            } else {
                Ok(())
            }
        });
        if let Err(e) = check {
            self.emit_snapshot();
            return Err(e);
        }

        self.session.video_enabled = !self.session.video_enabled;
        tracing::debug!(
            "Call {} video enabled: {}",
            self.session.id,
            self.session.video_enabled
        );

        let result = self.set_local_tracks(TrackKind::Video, self.session.video_enabled);
        self.emit_snapshot();
        result
    }

    /// Start buffering call audio. Only allowed while connected; does nothing
    /// if already recording.
    pub fn start_recording(&mut self) -> CallResult<()> {
        let check = self.ensure_active("start recording").and_then(|_| {
            if self.session.status == CallStatus::Connected {
                Ok(())
            } else {
                Err(CallError::invalid(self.session.status, "start recording"))
            }
        });
        if let Err(e) = check {
            self.emit_snapshot();
            return Err(e);
        }

        if self.recording.is_none() {
            self.recording = Some(RecordingBuffer::new(
                self.clock.now(),
                self.config.max_recording_bytes,
            ));
            self.session.recording = true;

            tracing::info!("Recording started for call {}", self.session.id);
            let _ = self.event_tx.send(CallEvent::RecordingStarted {
                call_id: self.session.id.clone(),
            });
        }

        self.emit_snapshot();
        Ok(())
    }

    /// Finalize the active recording. Returns `None` if nothing was being
    /// recorded.
    pub fn stop_recording(&mut self) -> CallResult<Option<CallRecording>> {
        if let Err(e) = self.ensure_active("stop recording") {
            self.emit_snapshot();
            return Err(e);
        }

        let recording = self.finalize_recording();
        self.emit_snapshot();
        Ok(recording)
    }

    /// Append an encoded audio chunk to the active recording.
    ///
    /// Chunks are kept in arrival order. Returns false when nothing is being
    /// recorded or the buffer is full.
    pub fn push_audio_chunk(&mut self, chunk: Bytes) -> bool {
        match self.recording.as_mut() {
            Some(buffer) => buffer.push(chunk),
            None => false,
        }
    }

    /// End the call from any non-terminal status.
    ///
    /// An active recording is finalized first and returned. Stream references
    /// are dropped; the streams themselves are left to their owners.
    pub fn end_call(&mut self) -> CallResult<Option<CallRecording>> {
        if let Err(e) = self.ensure_active("end call") {
            self.emit_snapshot();
            return Err(e);
        }

        let recording = self.finalize_recording();
        let elapsed = self.elapsed_seconds();

        let previous = self.session.status;
        self.session.status = CallStatus::Ended;
        self.ended_elapsed = Some(elapsed);
        self.local = None;
        self.remote = None;

        tracing::info!(
            "Call {} ended from {} after {}s",
            self.session.id,
            previous,
            elapsed
        );

        let _ = self.event_tx.send(CallEvent::Ended {
            elapsed_seconds: elapsed,
        });
        self.emit_snapshot();
        Ok(recording)
    }

    /// Whole seconds since the call connected.
    ///
    /// Zero before connecting, frozen once the call has ended, and never
    /// decreasing while connected.
    pub fn elapsed_seconds(&self) -> u64 {
        match self.session.status {
            CallStatus::Ended => self.ended_elapsed.unwrap_or(0),
            CallStatus::Connected => {
                let now = self.clock.now();
                let elapsed = self
                    .session
                    .start_time
                    .map(|start| (now - start).num_seconds().max(0) as u64)
                    .unwrap_or(0);
                let previous = self.elapsed_high_water.fetch_max(elapsed, Ordering::Relaxed);
                elapsed.max(previous)
            }
            CallStatus::Calling | CallStatus::Ringing => 0,
        }
    }

    fn transition(&mut self, next: CallStatus, operation: &str) -> CallResult<()> {
        let current = self.session.status;
        if !current.can_transition(next) {
            tracing::warn!("Rejected {} -> {} for call {}", current, next, self.session.id);
            return Err(CallError::invalid(current, operation));
        }

        tracing::debug!("Call {}: {} -> {}", self.session.id, current, next);
        self.session.status = next;
        Ok(())
    }

    fn ensure_active(&self, operation: &str) -> CallResult<()> {
        if self.session.status.is_terminal() {
            tracing::warn!("Rejected {} on ended call {}", operation, self.session.id);
            return Err(CallError::invalid(self.session.status, operation));
        }
        Ok(())
    }

    fn finalize_recording(&mut self) -> Option<CallRecording> {
        let buffer = self.recording.take()?;
        self.session.recording = false;

        let dropped = buffer.dropped_chunks();
        let recording = buffer.finalize(
            self.session.participant_names(),
            self.session.kind,
            self.clock.now(),
        );

        tracing::info!(
            "Recording {} finalized for call {}: {}s, {} bytes ({} chunks dropped)",
            recording.id(),
            self.session.id,
            recording.duration(),
            recording.size(),
            dropped
        );

        let _ = self.event_tx.send(CallEvent::RecordingFinalized {
            recording_id: recording.id().to_string(),
            duration: recording.duration(),
            size: recording.size(),
        });
        Some(recording)
    }

    /// Push the current mute and video flags down to the local tracks
    fn apply_local_intent(&self) -> CallResult<()> {
        let audio = self.set_local_tracks(TrackKind::Audio, !self.session.muted);
        let video = if self.session.kind == CallKind::Video {
            self.set_local_tracks(TrackKind::Video, self.session.video_enabled)
        } else {
            Ok(())
        };
        audio.and(video)
    }

    fn set_local_tracks(&self, kind: TrackKind, enabled: bool) -> CallResult<()> {
        let local = self.local_stream().ok_or_else(|| {
            tracing::warn!("Call {} has no local stream for {:?} tracks", self.session.id, kind);
            CallError::ResourceUnavailable("no local media stream".to_string())
        })?;

        local.set_tracks_enabled(kind, enabled).map(|_| ()).map_err(|e| {
            tracing::warn!("Failed to update local {:?} tracks: {}", kind, e);
            CallError::ResourceUnavailable(e.to_string())
        })
    }

    fn emit_snapshot(&self) {
        let _ = self.event_tx.send(CallEvent::Snapshot(self.session.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn setup(kind: CallKind) -> CallSetup {
        CallSetup::new(
            kind,
            Participant::new("me", "Ada"),
            vec![Participant::new("them", "Grace")],
        )
        .with_id("call-1")
    }

    fn controller(kind: CallKind) -> (CallSessionController, ManualClock) {
        let clock = ManualClock::default();
        let controller = CallSessionController::outgoing(
            setup(kind),
            Arc::new(clock.clone()),
            CallConfig::default(),
        );
        (controller, clock)
    }

    fn streams() -> MediaStreamPair {
        MediaStreamPair::new(
            Arc::new(MediaStream::audio_video("local")),
            Arc::new(MediaStream::audio_video("remote")),
        )
    }

    fn audio_enabled(stream: &MediaStream) -> bool {
        stream.tracks_of(TrackKind::Audio).all(|t| t.is_enabled())
    }

    fn video_enabled(stream: &MediaStream) -> bool {
        stream.tracks_of(TrackKind::Video).all(|t| t.is_enabled())
    }

    #[test]
    fn test_status_flow() {
        let (mut call, _) = controller(CallKind::Voice);
        assert_eq!(call.status(), CallStatus::Calling);
        assert_eq!(call.session().id, "call-1");

        call.ring().unwrap();
        assert_eq!(call.status(), CallStatus::Ringing);
        assert!(matches!(call.ring(), Err(CallError::InvalidTransition(_))));

        let pair = streams();
        call.connect(&pair).unwrap();
        assert_eq!(call.status(), CallStatus::Connected);
        assert!(call.session().start_time.is_some());
        assert!(matches!(call.connect(&pair), Err(CallError::InvalidTransition(_))));
    }

    #[test]
    fn test_incoming_starts_ringing() {
        let call = CallSessionController::incoming(
            setup(CallKind::Video),
            Arc::new(ManualClock::default()),
            CallConfig::default(),
        );
        assert_eq!(call.status(), CallStatus::Ringing);
        assert!(call.session().video_enabled);
    }

    #[test]
    fn test_mute_parity_and_track_side_effect() {
        let (mut call, _) = controller(CallKind::Voice);
        let pair = streams();
        call.connect(&pair).unwrap();

        for n in 1..=7 {
            call.toggle_mute().unwrap();
            assert_eq!(call.session().muted, n % 2 == 1);
            assert_eq!(audio_enabled(&pair.local), n % 2 == 0);
        }
        // Remote stream is never touched
        assert!(audio_enabled(&pair.remote));
    }

    #[test]
    fn test_mute_without_local_stream() {
        let (mut call, _) = controller(CallKind::Voice);

        let result = call.toggle_mute();
        assert!(matches!(result, Err(CallError::ResourceUnavailable(_))));
        assert!(call.session().muted);
    }

    #[test]
    fn test_video_toggle_without_video_track() {
        let (mut call, _) = controller(CallKind::Video);
        let pair = MediaStreamPair::new(
            Arc::new(MediaStream::audio("mic-only")),
            Arc::new(MediaStream::audio_video("remote")),
        );

        // Connects, but the camera intent cannot be applied
        let result = call.connect(&pair);
        assert!(matches!(result, Err(CallError::ResourceUnavailable(_))));
        assert_eq!(call.status(), CallStatus::Connected);

        let result = call.toggle_video();
        assert!(matches!(result, Err(CallError::ResourceUnavailable(_))));
        assert!(!call.session().video_enabled);
    }

    #[test]
    fn test_mute_intent_applied_on_attach() {
        let (mut call, _) = controller(CallKind::Video);
        let _ = call.toggle_mute();

        let local = Arc::new(MediaStream::audio_video("local"));
        call.attach_local_stream(&local).unwrap();
        assert!(!audio_enabled(&local));
        assert!(video_enabled(&local));
    }

    #[test]
    fn test_dropped_stream_is_unavailable() {
        let (mut call, _) = controller(CallKind::Voice);
        let pair = streams();
        call.connect(&pair).unwrap();
        drop(pair);

        assert!(call.local_stream().is_none());
        assert!(matches!(
            call.toggle_mute(),
            Err(CallError::ResourceUnavailable(_))
        ));
        assert!(call.session().muted);
    }

    #[test]
    fn test_revoked_track_is_unavailable() {
        let (mut call, _) = controller(CallKind::Voice);
        let pair = streams();
        call.connect(&pair).unwrap();
        for track in pair.local.tracks() {
            track.stop();
        }

        assert!(matches!(
            call.toggle_mute(),
            Err(CallError::ResourceUnavailable(_))
        ));
        assert!(call.session().muted);
    }

    #[test]
    fn test_video_toggle() {
        let (mut call, _) = controller(CallKind::Video);
        let pair = streams();
        call.connect(&pair).unwrap();

        call.toggle_video().unwrap();
        assert!(!call.session().video_enabled);
        assert!(!video_enabled(&pair.local));
        assert_eq!(pair.local.tracks().len(), 2);

        call.toggle_video().unwrap();
        assert!(call.session().video_enabled);
        assert!(video_enabled(&pair.local));
    }

    #[test]
    fn test_video_toggle_rejected_for_voice() {
        let (mut call, _) = controller(CallKind::Voice);
        call.connect(&streams()).unwrap();

        assert!(matches!(
            call.toggle_video(),
            Err(CallError::InvalidTransition(_))
        ));
        assert!(!call.session().video_enabled);
    }

    #[test]
    fn test_recording_requires_connection() {
        let (mut call, _) = controller(CallKind::Voice);

        assert!(matches!(
            call.start_recording(),
            Err(CallError::InvalidTransition(_))
        ));
        assert!(!call.is_recording());
        assert_eq!(call.stop_recording().unwrap(), None);
    }

    #[test]
    fn test_recording_lifecycle() {
        let (mut call, clock) = controller(CallKind::Voice);
        call.connect(&streams()).unwrap();

        assert!(!call.push_audio_chunk(Bytes::from_static(b"early")));

        call.start_recording().unwrap();
        call.start_recording().unwrap();
        assert!(call.is_recording());

        assert!(call.push_audio_chunk(Bytes::from_static(b"one")));
        assert!(call.push_audio_chunk(Bytes::from_static(b"two")));
        clock.advance_secs(12);

        let recording = call.stop_recording().unwrap().unwrap();
        assert!(!call.is_recording());
        assert_eq!(recording.audio_data().as_ref(), b"onetwo");
        assert_eq!(recording.size(), 6);
        assert_eq!(recording.duration(), 12);
        assert_eq!(recording.participants(), ["Ada", "Grace"]);
        assert_eq!(recording.call_type(), CallKind::Voice);

        assert_eq!(call.stop_recording().unwrap(), None);
    }

    #[test]
    fn test_immediate_stop_yields_empty_recording() {
        let (mut call, _) = controller(CallKind::Video);
        call.connect(&streams()).unwrap();

        call.start_recording().unwrap();
        let recording = call.stop_recording().unwrap().unwrap();
        assert_eq!(recording.duration(), 0);
        assert_eq!(recording.size(), 0);
    }

    #[test]
    fn test_end_call_finalizes_recording() {
        let (mut call, clock) = controller(CallKind::Voice);
        call.connect(&streams()).unwrap();
        call.start_recording().unwrap();
        call.push_audio_chunk(Bytes::from_static(b"audio"));
        clock.advance_secs(3);

        let recording = call.end_call().unwrap();
        assert_eq!(recording.map(|r| r.size()), Some(5));
        assert!(!call.is_recording());
        assert_eq!(call.status(), CallStatus::Ended);
        assert!(call.local_stream().is_none());
        assert!(call.remote_stream().is_none());
    }

    #[test]
    fn test_ended_session_rejects_mutation() {
        let (mut call, _) = controller(CallKind::Video);
        call.connect(&streams()).unwrap();
        assert_eq!(call.end_call().unwrap(), None);
        let before = call.snapshot();

        assert!(matches!(call.toggle_mute(), Err(CallError::InvalidTransition(_))));
        assert!(matches!(call.toggle_video(), Err(CallError::InvalidTransition(_))));
        assert!(matches!(call.start_recording(), Err(CallError::InvalidTransition(_))));
        assert!(matches!(call.stop_recording(), Err(CallError::InvalidTransition(_))));
        assert!(matches!(call.end_call(), Err(CallError::InvalidTransition(_))));
        assert!(matches!(call.ring(), Err(CallError::InvalidTransition(_))));
        assert_eq!(call.snapshot(), before);
    }

    #[test]
    fn test_elapsed_seconds() {
        let (mut call, clock) = controller(CallKind::Video);
        clock.advance_secs(30);
        assert_eq!(call.elapsed_seconds(), 0);

        call.connect(&streams()).unwrap();
        clock.advance_secs(65);
        assert_eq!(call.elapsed_seconds(), 65);

        // A clock stepping backwards does not move the timer back
        clock.advance(Duration::seconds(-10));
        assert_eq!(call.elapsed_seconds(), 65);

        clock.advance_secs(15);
        call.end_call().unwrap();
        clock.advance_secs(100);
        assert_eq!(call.elapsed_seconds(), 70);
    }

    #[test]
    fn test_elapsed_zero_when_never_connected() {
        let (mut call, clock) = controller(CallKind::Voice);
        call.ring().unwrap();
        clock.advance_secs(20);
        call.end_call().unwrap();
        clock.advance_secs(20);

        assert_eq!(call.elapsed_seconds(), 0);
        assert!(call.session().start_time.is_none());
    }

    #[test]
    fn test_snapshot_emitted_after_operations() {
        let (mut call, _) = controller(CallKind::Voice);
        let mut rx = call.subscribe();

        let _ = call.toggle_mute();
        call.connect(&streams()).unwrap();
        call.start_recording().unwrap();
        call.end_call().unwrap();

        let mut snapshots = 0;
        let mut finalized = 0;
        let mut ended = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                CallEvent::Snapshot(_) => snapshots += 1,
                CallEvent::RecordingFinalized { .. } => finalized += 1,
                CallEvent::Ended { .. } => ended += 1,
                CallEvent::RecordingStarted { .. } => {}
            }
        }
        assert_eq!(snapshots, 4);
        assert_eq!(finalized, 1);
        assert_eq!(ended, 1);
    }
}
