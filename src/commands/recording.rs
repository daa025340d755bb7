//! Recording playback commands
//!
//! Entry points for the recordings list and the recording player view.

use crate::config::PlayerConfig;
use crate::recording::{
    CallRecording, InMemoryRecordingStore, PlaybackRegistry, PlaybackState, RecordingPlayer,
    RecordingStore,
};
use crate::utils::ErrorResponse;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application state for recording playback
pub struct RecordingsState {
    pub store: Arc<dyn RecordingStore>,
    pub player: Mutex<RecordingPlayer>,
}

impl RecordingsState {
    pub fn new(
        store: Arc<dyn RecordingStore>,
        registry: PlaybackRegistry,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            store,
            player: Mutex::new(RecordingPlayer::new(registry, config)),
        }
    }
}

impl Default for RecordingsState {
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryRecordingStore::new()),
            PlaybackRegistry::new(),
            &PlayerConfig::default(),
        )
    }
}

/// Get stored recordings, newest first
pub async fn list_recordings(state: &RecordingsState) -> Result<Vec<CallRecording>, ErrorResponse> {
    Ok(state.store.list().await?)
}

/// Load a stored recording into the player
pub async fn open_recording(
    state: &RecordingsState,
    recording_id: String,
) -> Result<PlaybackState, ErrorResponse> {
    let recording = state.store.get(&recording_id).await?;
    let mut player = state.player.lock().await;
    player.open(&recording)?;
    Ok(player.state())
}

pub async fn play_recording(state: &RecordingsState) -> Result<PlaybackState, ErrorResponse> {
    let mut player = state.player.lock().await;
    player.play()?;
    Ok(player.state())
}

pub async fn pause_recording(state: &RecordingsState) -> Result<PlaybackState, ErrorResponse> {
    let mut player = state.player.lock().await;
    player.pause();
    Ok(player.state())
}

pub async fn seek_recording(
    state: &RecordingsState,
    position_secs: f64,
) -> Result<PlaybackState, ErrorResponse> {
    let mut player = state.player.lock().await;
    player.seek(position_secs)?;
    Ok(player.state())
}

pub async fn set_playback_volume(
    state: &RecordingsState,
    level: f32,
) -> Result<PlaybackState, ErrorResponse> {
    let mut player = state.player.lock().await;
    player.set_volume(level);
    Ok(player.state())
}

pub async fn toggle_playback_mute(state: &RecordingsState) -> Result<PlaybackState, ErrorResponse> {
    let mut player = state.player.lock().await;
    player.toggle_mute();
    Ok(player.state())
}

/// Release the player's recording when the player view goes away
pub async fn close_recording(state: &RecordingsState) -> Result<PlaybackState, ErrorResponse> {
    let mut player = state.player.lock().await;
    player.close();
    Ok(player.state())
}

/// Delete a stored recording, closing it first if it is playing
pub async fn delete_recording(
    state: &RecordingsState,
    recording_id: String,
) -> Result<(), ErrorResponse> {
    {
        let mut player = state.player.lock().await;
        if player.recording().map(|r| r.id()) == Some(recording_id.as_str()) {
            player.close();
        }
    }

    state.store.delete(&recording_id).await?;
    tracing::info!("Deleted recording {}", recording_id);
    Ok(())
}
