use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of the capture session owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Armed,
    Active,
    Finalizing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Armed => "armed",
            SessionState::Active => "active",
            SessionState::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Controller state when the snapshot was taken
    pub state: SessionState,

    /// Session identifier, absent when no session exists
    pub session_id: Option<String>,

    /// Recording file being streamed
    pub location: Option<PathBuf>,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Bytes read from storage so far
    pub bytes_consumed: u64,

    /// Frames handed to the transport so far
    pub frames_sent: u64,

    /// Whether the remote end acknowledged the finalize signal
    pub finalized: bool,
}

impl SessionStats {
    pub fn idle(state: SessionState, location: Option<PathBuf>) -> Self {
        Self {
            state,
            session_id: None,
            location,
            started_at: None,
            bytes_consumed: 0,
            frames_sent: 0,
            finalized: false,
        }
    }
}
