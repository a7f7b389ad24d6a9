//! Capture session management
//!
//! This module provides the `SessionController` that owns, for one recording at a time:
//! - The growing-file tailer and its poll loop
//! - The frame assembler
//! - The stream transport connection
//! - The finalize signal on stop

mod config;
mod error;
mod session;
mod stats;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::SessionController;
pub use stats::{SessionState, SessionStats};
