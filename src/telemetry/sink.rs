use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::sample::TelemetrySample;

/// Timeout for one telemetry request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a telemetry delivery attempt failed. Every variant is retryable.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Transport-level failure, including timeouts
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status
    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    /// The sample could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Delivers one telemetry sample per call
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn deliver(&self, sample: &TelemetrySample) -> Result<(), DeliveryError>;
}

/// POSTs samples as JSON to the telemetry endpoint
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    url: String,
}

impl HttpTelemetrySink {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn deliver(&self, sample: &TelemetrySample) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(sample).map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        debug!("Telemetry accepted by {} (HTTP {})", self.url, status.as_u16());
        Ok(())
    }
}
