use thiserror::Error;

use super::stats::SessionState;

/// Errors returned by the session controller
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already streaming
    #[error("a capture session is already {0}")]
    AlreadyActive(SessionState),

    /// Arming is only possible while no session exists
    #[error("cannot arm while {0}")]
    NotArmable(SessionState),

    /// No recording location was given or armed
    #[error("no recording location armed")]
    NoLocation,

    /// The stream connection could not be opened
    #[error("stream connection failed: {0:#}")]
    Connect(anyhow::Error),
}
