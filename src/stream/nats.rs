use anyhow::{Context, Result};
use async_nats::{Client, ConnectOptions, Event};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{FrameMessage, StreamAck};
use super::transport::{FrameSink, StreamConnector};
use crate::capture::Frame;

/// Connects each session to a NATS server
pub struct NatsConnector {
    url: String,
    subject_prefix: String,
    connect_timeout: Duration,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl StreamConnector for NatsConnector {
    async fn connect(&self, session_id: &str) -> Result<Box<dyn FrameSink>> {
        info!("Connecting to NATS at {}", self.url);

        let events_session = session_id.to_string();
        let client = ConnectOptions::new()
            .connection_timeout(self.connect_timeout)
            .event_callback(move |event| {
                let session_id = events_session.clone();
                async move {
                    match event {
                        Event::Connected => info!("Stream connection up for {}", session_id),
                        Event::Disconnected => {
                            warn!("Stream connection dropped for {}", session_id)
                        }
                        Event::ClientError(e) => {
                            error!("Stream connection error for {}: {:?}", session_id, e)
                        }
                        other => debug!("Stream connection event for {}: {:?}", session_id, other),
                    }
                }
            })
            .connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        let ack_subject = format!("{}.ack.{}", self.subject_prefix, session_id);
        let mut subscriber = client
            .subscribe(ack_subject.clone())
            .await
            .context("Failed to subscribe to stream acknowledgements")?;

        info!("Subscribed to {}", ack_subject);

        let inbound_session = session_id.to_string();
        let inbound_task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<StreamAck>(&msg.payload) {
                    Ok(ack) => info!(
                        "Inbound message for {}: {} (sequence={:?})",
                        inbound_session, ack.status, ack.sequence
                    ),
                    Err(e) => warn!("Failed to parse inbound message: {}", e),
                }
            }
            debug!("Inbound listener stopped for {}", inbound_session);
        });

        Ok(Box::new(NatsFrameSink {
            client,
            frame_subject: format!("{}.frame.{}", self.subject_prefix, session_id),
            inbound_task,
        }))
    }
}

/// Publishes frames on `<prefix>.frame.<session_id>`
pub struct NatsFrameSink {
    client: Client,
    frame_subject: String,
    inbound_task: JoinHandle<()>,
}

#[async_trait::async_trait]
impl FrameSink for NatsFrameSink {
    async fn send_frame(&mut self, session_id: &str, frame: &Frame) -> Result<()> {
        let message = FrameMessage::from_frame(session_id, frame);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(self.frame_subject.clone(), payload.into())
            .await
            .context("Failed to publish frame")?;

        debug!(
            "Published frame to {} (sequence={}, bytes={})",
            self.frame_subject,
            frame.sequence,
            frame.len()
        );

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.client.flush().await.context("Failed to flush NATS connection")?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        info!("Closing NATS connection");
        self.inbound_task.abort();
        // async-nats handles cleanup on drop
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
