use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::capture::Frame;

/// One capture frame as published on the stream connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMessage {
    pub session_id: String,
    pub sequence: u64,
    pub offset: u64,
    pub data: String,  // Base64-encoded frame bytes
    pub timestamp: String,  // RFC3339 timestamp
}

impl FrameMessage {
    pub fn from_frame(session_id: &str, frame: &Frame) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence: frame.sequence,
            offset: frame.offset,
            data: base64::engine::general_purpose::STANDARD.encode(&frame.data),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn decode_data(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .context("Frame data is not valid base64")
    }
}

/// End-of-stream signal sent over the finalize channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub session_id: String,
    pub frame_count: u64,
    pub byte_count: u64,
    pub timestamp: String,
}

/// Inbound message from the stream endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamAck {
    pub session_id: String,
    #[serde(default)]
    pub sequence: Option<u64>,
    pub status: String,
}
