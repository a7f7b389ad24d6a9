// Shared test doubles for the remote stream endpoint
//
// Every interaction with the "remote side" is appended to one ordered log so
// tests can assert on arrival order across the stream and finalize channels.

#![allow(dead_code)]

use anyhow::{bail, Result};
use capture_relay::capture::Frame;
use capture_relay::stream::{FinalizeChannel, FinalizeRequest, FrameSink, StreamConnector};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum RemoteEvent {
    Connected(String),
    Frame { session_id: String, sequence: u64, data: Vec<u8> },
    Flushed,
    Finalize(FinalizeRequest),
    Closed,
}

#[derive(Clone, Default)]
pub struct RemoteLog {
    events: Arc<Mutex<Vec<RemoteEvent>>>,
}

impl RemoteLog {
    pub fn push(&self, event: RemoteEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<RemoteEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RemoteEvent::Frame { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn frame_sizes(&self) -> Vec<usize> {
        self.frames().iter().map(|f| f.len()).collect()
    }

    pub fn reassembled(&self) -> Vec<u8> {
        self.frames().concat()
    }

    pub fn finalize_requests(&self) -> Vec<FinalizeRequest> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RemoteEvent::Finalize(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, pred: impl Fn(&RemoteEvent) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }

    pub fn last_position(&self, pred: impl Fn(&RemoteEvent) -> bool) -> Option<usize> {
        self.events().iter().rposition(pred)
    }
}

/// Connector whose sinks write into a shared log
pub struct RecordingConnector {
    pub log: RemoteLog,
}

#[async_trait::async_trait]
impl StreamConnector for RecordingConnector {
    async fn connect(&self, session_id: &str) -> Result<Box<dyn FrameSink>> {
        self.log.push(RemoteEvent::Connected(session_id.to_string()));
        Ok(Box::new(RecordingSink {
            log: self.log.clone(),
        }))
    }
}

pub struct RecordingSink {
    log: RemoteLog,
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&mut self, session_id: &str, frame: &Frame) -> Result<()> {
        // Give the capture loop a chance to run ahead of the I/O loop
        tokio::task::yield_now().await;
        self.log.push(RemoteEvent::Frame {
            session_id: session_id.to_string(),
            sequence: frame.sequence,
            data: frame.data.to_vec(),
        });
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.log.push(RemoteEvent::Flushed);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.push(RemoteEvent::Closed);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Connector that never connects
pub struct UnreachableConnector;

#[async_trait::async_trait]
impl StreamConnector for UnreachableConnector {
    async fn connect(&self, _session_id: &str) -> Result<Box<dyn FrameSink>> {
        bail!("connection refused")
    }
}

/// Finalize channel writing into the shared log
pub struct RecordingFinalizer {
    pub log: RemoteLog,
    pub fail: bool,
}

#[async_trait::async_trait]
impl FinalizeChannel for RecordingFinalizer {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<()> {
        if self.fail {
            bail!("finalize endpoint unavailable");
        }
        self.log.push(RemoteEvent::Finalize(request.clone()));
        Ok(())
    }
}
