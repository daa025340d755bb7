//! Call commands
//!
//! Entry points the call view invokes in response to user input. Each command
//! returns the session snapshot to render or an [`ErrorResponse`].

use crate::call::{
    CallKind, CallSession, CallSessionController, CallSetup, MediaStreamPair, Participant,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CallConfig;
use crate::recording::{CallRecording, InMemoryRecordingStore, RecordingStore};
use crate::utils::{CallError, CallResult, ErrorResponse, StoreError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application state for the active call
pub struct CallState {
    pub controller: Arc<Mutex<Option<CallSessionController>>>,
    pub store: Arc<dyn RecordingStore>,
    /// Finalized recordings the store refused, kept until a retry succeeds
    pub pending: Arc<Mutex<Vec<CallRecording>>>,
    pub clock: Arc<dyn Clock>,
    pub config: CallConfig,
}

impl CallState {
    pub fn new(store: Arc<dyn RecordingStore>, clock: Arc<dyn Clock>, config: CallConfig) -> Self {
        Self {
            controller: Arc::new(Mutex::new(None)),
            store,
            pending: Arc::new(Mutex::new(Vec::new())),
            clock,
            config,
        }
    }
}

impl Default for CallState {
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryRecordingStore::new()),
            Arc::new(SystemClock),
            CallConfig::default(),
        )
    }
}

fn no_active_call() -> ErrorResponse {
    CallError::ResourceUnavailable("no active call".to_string()).into()
}

/// Replace the current session, refusing while another call is still live
async fn begin(
    state: &CallState,
    controller: CallSessionController,
) -> Result<CallSession, ErrorResponse> {
    let mut current = state.controller.lock().await;

    if let Some(existing) = current.as_ref() {
        if !existing.status().is_terminal() {
            return Err(CallError::InvalidTransition(format!(
                "call {} is already in progress",
                existing.session().id
            ))
            .into());
        }
    }

    let snapshot = controller.snapshot();
    *current = Some(controller);
    Ok(snapshot)
}

/// Run `op` against the active controller and return the resulting snapshot
async fn update<F>(state: &CallState, op: F) -> Result<CallSession, ErrorResponse>
where
    F: FnOnce(&mut CallSessionController) -> CallResult<()>,
{
    let mut current = state.controller.lock().await;
    let controller = current.as_mut().ok_or_else(no_active_call)?;
    op(controller)?;
    Ok(controller.snapshot())
}

/// Save a finalized recording. On failure it is kept in `state.pending`.
async fn persist(state: &CallState, recording: &CallRecording) -> Result<(), ErrorResponse> {
    if let Err(e) = state.store.save(recording.clone()).await {
        tracing::error!("Failed to store recording {}: {}", recording.id(), e);
        state.pending.lock().await.push(recording.clone());
        return Err(e.into());
    }
    Ok(())
}

/// Place a call
pub async fn start_call(
    state: &CallState,
    kind: CallKind,
    initiator: Participant,
    participants: Vec<Participant>,
) -> Result<CallSession, ErrorResponse> {
    let setup = CallSetup::new(kind, initiator, participants);
    let controller =
        CallSessionController::outgoing(setup, Arc::clone(&state.clock), state.config.clone());
    begin(state, controller).await
}

/// Register a call received from the signaling layer
pub async fn receive_call(
    state: &CallState,
    call_id: String,
    kind: CallKind,
    initiator: Participant,
    participants: Vec<Participant>,
) -> Result<CallSession, ErrorResponse> {
    let setup = CallSetup::new(kind, initiator, participants).with_id(call_id);
    let controller =
        CallSessionController::incoming(setup, Arc::clone(&state.clock), state.config.clone());
    begin(state, controller).await
}

/// The remote side is being notified
pub async fn mark_ringing(state: &CallState) -> Result<CallSession, ErrorResponse> {
    update(state, |c| c.ring()).await
}

/// Media is flowing in both directions
pub async fn connect_call(
    state: &CallState,
    streams: MediaStreamPair,
) -> Result<CallSession, ErrorResponse> {
    update(state, |c| c.connect(&streams)).await
}

pub async fn toggle_mute(state: &CallState) -> Result<CallSession, ErrorResponse> {
    update(state, |c| c.toggle_mute()).await
}

pub async fn toggle_video(state: &CallState) -> Result<CallSession, ErrorResponse> {
    update(state, |c| c.toggle_video()).await
}

pub async fn start_recording(state: &CallState) -> Result<CallSession, ErrorResponse> {
    update(state, |c| c.start_recording()).await
}

/// Stop recording and store the finished recording
pub async fn stop_recording(state: &CallState) -> Result<Option<CallRecording>, ErrorResponse> {
    let mut current = state.controller.lock().await;
    let controller = current.as_mut().ok_or_else(no_active_call)?;

    let recording = controller.stop_recording()?;
    if let Some(recording) = &recording {
        persist(state, recording).await?;
    }
    Ok(recording)
}

/// Hang up. A recording in progress is finalized and stored, or kept pending
/// if the store refuses it.
pub async fn end_call(state: &CallState) -> Result<CallSession, ErrorResponse> {
    let mut current = state.controller.lock().await;
    let controller = current.as_mut().ok_or_else(no_active_call)?;

    let recording = controller.end_call()?;
    if let Some(recording) = &recording {
        persist(state, recording).await?;
    }
    Ok(controller.snapshot())
}

/// Recordings finalized but not yet stored
pub async fn pending_recordings(state: &CallState) -> Result<Vec<CallRecording>, ErrorResponse> {
    Ok(state.pending.lock().await.clone())
}

/// Try to store every pending recording again and return those stored.
///
/// Recordings the store still refuses stay pending. A recording the store
/// already holds counts as stored.
pub async fn retry_pending_recordings(
    state: &CallState,
) -> Result<Vec<CallRecording>, ErrorResponse> {
    let mut pending = state.pending.lock().await;
    let mut stored = Vec::new();
    let mut remaining = Vec::new();

    for recording in pending.drain(..) {
        match state.store.save(recording.clone()).await {
            Ok(()) | Err(StoreError::Duplicate(_)) => {
                tracing::info!("Stored pending recording {}", recording.id());
                stored.push(recording);
            }
            Err(e) => {
                tracing::warn!("Recording {} still not stored: {}", recording.id(), e);
                remaining.push(recording);
            }
        }
    }

    *pending = remaining;
    Ok(stored)
}

/// Current session, if any
pub async fn get_call_state(state: &CallState) -> Result<Option<CallSession>, ErrorResponse> {
    let current = state.controller.lock().await;
    Ok(current.as_ref().map(|c| c.snapshot()))
}

/// Seconds the active call has been connected
pub async fn get_call_duration(state: &CallState) -> Result<u64, ErrorResponse> {
    let current = state.controller.lock().await;
    Ok(current.as_ref().map(|c| c.elapsed_seconds()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallStatus, MediaStream};
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose saves fail while `offline` is set
    #[derive(Default)]
    struct FlakyStore {
        offline: AtomicBool,
        inner: InMemoryRecordingStore,
    }

    #[async_trait]
    impl RecordingStore for FlakyStore {
        async fn save(&self, recording: CallRecording) -> Result<(), StoreError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::NotFound("storage offline".to_string()));
            }
            self.inner.save(recording).await
        }

        async fn get(&self, id: &str) -> Result<CallRecording, StoreError> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<CallRecording>, StoreError> {
            self.inner.list().await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }

    fn state() -> (CallState, Arc<InMemoryRecordingStore>, ManualClock) {
        let store = Arc::new(InMemoryRecordingStore::new());
        let clock = ManualClock::default();
        let state = CallState::new(store.clone(), Arc::new(clock.clone()), CallConfig::default());
        (state, store, clock)
    }

    fn pair() -> MediaStreamPair {
        MediaStreamPair::new(
            Arc::new(MediaStream::audio("local")),
            Arc::new(MediaStream::audio("remote")),
        )
    }

    fn people() -> (Participant, Vec<Participant>) {
        (
            Participant::new("me", "Ada"),
            vec![Participant::new("them", "Grace").with_avatar("grace.png")],
        )
    }

    #[tokio::test]
    async fn test_call_flow_stores_recording_on_hangup() {
        let (state, store, clock) = state();
        let (me, others) = people();
        let streams = pair();

        start_call(&state, CallKind::Voice, me, others).await.unwrap();
        mark_ringing(&state).await.unwrap();
        connect_call(&state, streams.clone()).await.unwrap();
        start_recording(&state).await.unwrap();

        {
            let mut current = state.controller.lock().await;
            let controller = current.as_mut().unwrap();
            controller.push_audio_chunk(Bytes::from_static(b"chunk"));
        }
        clock.advance_secs(9);

        assert_eq!(get_call_duration(&state).await.unwrap(), 9);
        let session = end_call(&state).await.unwrap();
        assert_eq!(session.status, CallStatus::Ended);
        assert!(!session.recording);

        let stored = store.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].duration(), 9);
        assert_eq!(stored[0].size(), 5);
    }

    #[tokio::test]
    async fn test_second_call_rejected_while_live() {
        let (state, _, _) = state();
        let (me, others) = people();

        start_call(&state, CallKind::Video, me.clone(), others.clone()).await.unwrap();
        let incoming = "incoming".to_string();
        let err = receive_call(&state, incoming, CallKind::Voice, me.clone(), others.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_TRANSITION");

        end_call(&state).await.unwrap();
        let session = receive_call(&state, "incoming".to_string(), CallKind::Voice, me, others)
            .await
            .unwrap();
        assert_eq!(session.id, "incoming");
        assert_eq!(session.status, CallStatus::Ringing);
    }

    #[tokio::test]
    async fn test_commands_without_call() {
        let (state, _, _) = state();

        assert_eq!(toggle_mute(&state).await.unwrap_err().code, "RESOURCE_UNAVAILABLE");
        assert_eq!(get_call_state(&state).await.unwrap(), None);
        assert_eq!(get_call_duration(&state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_recording_persists() {
        let (state, store, _) = state();
        let (me, others) = people();

        start_call(&state, CallKind::Voice, me, others).await.unwrap();
        connect_call(&state, pair()).await.unwrap();
        start_recording(&state).await.unwrap();

        let recording = stop_recording(&state).await.unwrap().unwrap();
        assert_eq!(store.get(recording.id()).await.unwrap(), recording);
        assert_eq!(stop_recording(&state).await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_recording_for_retry() {
        let store = Arc::new(FlakyStore::default());
        store.offline.store(true, Ordering::SeqCst);
        let state = CallState::new(
            store.clone(),
            Arc::new(ManualClock::default()),
            CallConfig::default(),
        );
        let (me, others) = people();

        start_call(&state, CallKind::Voice, me, others).await.unwrap();
        connect_call(&state, pair()).await.unwrap();
        start_recording(&state).await.unwrap();
        {
            let mut current = state.controller.lock().await;
            let controller = current.as_mut().unwrap();
            controller.push_audio_chunk(Bytes::from_static(b"12345678"));
        }

        assert!(end_call(&state).await.is_err());
        let session = get_call_state(&state).await.unwrap().unwrap();
        assert_eq!(session.status, CallStatus::Ended);

        let pending = pending_recordings(&state).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].size(), 8);

        // Still offline: nothing is lost
        assert!(retry_pending_recordings(&state).await.unwrap().is_empty());
        assert_eq!(pending_recordings(&state).await.unwrap().len(), 1);

        store.offline.store(false, Ordering::SeqCst);
        let stored = retry_pending_recordings(&state).await.unwrap();
        assert_eq!(stored, pending);
        assert!(pending_recordings(&state).await.unwrap().is_empty());
        assert_eq!(store.get(pending[0].id()).await.unwrap().size(), 8);
    }
}
