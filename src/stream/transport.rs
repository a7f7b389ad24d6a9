use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::capture::Frame;

/// Write side of one stream connection
#[async_trait::async_trait]
pub trait FrameSink: Send {
    /// Transmit a single frame
    async fn send_frame(&mut self, session_id: &str, frame: &Frame) -> Result<()>;

    /// Push everything buffered by the connection onto the wire
    async fn flush(&mut self) -> Result<()>;

    /// Tear the connection down
    async fn close(self: Box<Self>) -> Result<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Opens a fresh stream connection for each session
#[async_trait::async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, session_id: &str) -> Result<Box<dyn FrameSink>>;
}

/// Non-blocking handle used by the capture loop to queue frames
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameSender {
    /// Queue a frame for transmission. Never waits on the network.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|e| anyhow!("Transport queue closed, frame {} not queued", e.0.sequence))
    }
}

/// Persistent connection carrying the frames of exactly one session.
///
/// Frames are queued without blocking and written by a dedicated I/O task
/// in submission order.
pub struct StreamTransport {
    session_id: String,
    tx: Option<mpsc::UnboundedSender<Frame>>,
    io_task: Option<JoinHandle<(Box<dyn FrameSink>, u64)>>,
    sink: Option<Box<dyn FrameSink>>,
    frames_sent: u64,
}

impl StreamTransport {
    /// Connect and start the outbound I/O loop
    pub async fn connect(connector: &dyn StreamConnector, session_id: &str) -> Result<Self> {
        let sink = connector
            .connect(session_id)
            .await
            .context("Failed to open stream connection")?;

        info!("Stream transport connected via {} for {}", sink.name(), session_id);

        let (tx, rx) = mpsc::unbounded_channel();
        let io_task = tokio::spawn(Self::io_loop(session_id.to_string(), sink, rx));

        Ok(Self {
            session_id: session_id.to_string(),
            tx: Some(tx),
            io_task: Some(io_task),
            sink: None,
            frames_sent: 0,
        })
    }

    /// Handle for queueing frames
    pub fn sender(&self) -> Option<FrameSender> {
        self.tx.as_ref().map(|tx| FrameSender { tx: tx.clone() })
    }

    /// Close the outbound queue and wait until every queued frame has been
    /// handed to the connection and flushed.
    ///
    /// Outstanding `FrameSender` clones must be dropped first, otherwise this
    /// waits for them.
    pub async fn drain(&mut self) -> Result<u64> {
        drop(self.tx.take());

        if let Some(task) = self.io_task.take() {
            let (sink, sent) = task.await.context("Transport I/O task panicked")?;
            self.frames_sent = sent;
            self.sink = Some(sink);
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.flush().await.context("Failed to flush stream connection")?;
        }

        Ok(self.frames_sent)
    }

    /// Drain (if not already done) and close the connection
    pub async fn disconnect(mut self) -> Result<u64> {
        if self.io_task.is_some() {
            if let Err(e) = self.drain().await {
                error!("Failed to drain transport for {}: {}", self.session_id, e);
            }
        }

        if let Some(sink) = self.sink.take() {
            sink.close().await.context("Failed to close stream connection")?;
        }

        info!(
            "Stream transport disconnected for {} ({} frames sent)",
            self.session_id, self.frames_sent
        );

        Ok(self.frames_sent)
    }

    async fn io_loop(
        session_id: String,
        mut sink: Box<dyn FrameSink>,
        mut rx: mpsc::UnboundedReceiver<Frame>,
    ) -> (Box<dyn FrameSink>, u64) {
        debug!("Transport I/O loop started for {}", session_id);
        let mut sent = 0u64;

        while let Some(frame) = rx.recv().await {
            match sink.send_frame(&session_id, &frame).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    // No per-frame retry; the connection owns delivery
                    error!("Failed to send frame {} for {}: {}", frame.sequence, session_id, e);
                }
            }
        }

        debug!("Transport I/O loop finished for {} ({} frames)", session_id, sent);
        (sink, sent)
    }
}
