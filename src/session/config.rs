use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{DEFAULT_FRAME_CAPACITY, DEFAULT_READ_CEILING};

/// Shortest poll interval the capture loop will tick at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for capture sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How often the recording file is checked for new bytes
    /// Default: 64ms, below one audio buffer of latency
    pub poll_interval: Duration,

    /// Size of every frame except the last one of a session
    pub frame_capacity: usize,

    /// Upper bound on bytes read by a single poll
    pub read_ceiling: usize,

    /// Base directory for relative recording locations
    #[serde(default)]
    pub recordings_dir: Option<PathBuf>,
}

impl SessionConfig {
    /// Resolve a recording location against `recordings_dir`.
    ///
    /// Absolute locations are returned unchanged.
    pub fn resolve(&self, location: &Path) -> PathBuf {
        match &self.recordings_dir {
            Some(dir) if location.is_relative() => dir.join(location),
            _ => location.to_path_buf(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(64),
            frame_capacity: DEFAULT_FRAME_CAPACITY, // 2 KiB
            read_ceiling: DEFAULT_READ_CEILING,
            recordings_dir: None,
        }
    }
}
