//! Call state management
//!
//! Defines the call status state machine and the session data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Local side originated the call, no media confirmed yet
    Calling,
    /// Remote side has been notified but has not accepted
    Ringing,
    /// Both media streams are active
    Connected,
    /// Terminal
    Ended,
}

impl CallStatus {
    /// Whether a session in this status may move to `next`.
    ///
    /// Any non-terminal status may end. `Calling` may connect directly when the
    /// transport confirms media before a ringing notification arrives.
    pub fn can_transition(self, next: CallStatus) -> bool {
        use CallStatus::*;

        match (self, next) {
            (Ended, _) => false,
            (_, Ended) => true,
            (Calling, Ringing) => true,
            (Calling, Connected) | (Ringing, Connected) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == CallStatus::Ended
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Calling => "calling",
            CallStatus::Ringing => "ringing",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of call, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Voice,
    Video,
}

/// A call participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,

    /// Name shown in the call view
    pub name: String,

    /// Avatar image reference, if the user has one
    pub avatar: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Snapshot of a call session as rendered by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub id: String,
    pub kind: CallKind,
    pub status: CallStatus,
    pub initiator: Participant,

    /// The first entry is the other party in a two-party call
    pub participants: Vec<Participant>,

    /// Set when the call connects
    pub start_time: Option<DateTime<Utc>>,

    pub muted: bool,

    /// Ignored by consumers for voice calls
    pub video_enabled: bool,

    pub recording: bool,
}

impl CallSession {
    pub(crate) fn new(
        id: String,
        kind: CallKind,
        status: CallStatus,
        initiator: Participant,
        participants: Vec<Participant>,
    ) -> Self {
        Self {
            id,
            kind,
            status,
            initiator,
            participants,
            start_time: None,
            muted: false,
            video_enabled: kind == CallKind::Video,
            recording: false,
        }
    }

    /// The other party of a two-party call
    pub fn other_party(&self) -> Option<&Participant> {
        self.participants.first()
    }

    /// Whether video should be shown for this session
    pub fn shows_video(&self) -> bool {
        self.kind == CallKind::Video && self.video_enabled
    }

    /// Display names of everyone on the call, initiator first, without duplicates
    pub fn participant_names(&self) -> Vec<String> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.participants.len() + 1);
        let mut names = Vec::with_capacity(self.participants.len() + 1);

        for participant in std::iter::once(&self.initiator).chain(self.participants.iter()) {
            if seen.contains(&participant.id.as_str()) {
                continue;
            }
            seen.push(participant.id.as_str());
            names.push(participant.name.clone());
        }

        names
    }
}
