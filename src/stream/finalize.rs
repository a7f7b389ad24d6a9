use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::info;

use super::messages::FinalizeRequest;

/// Side channel telling the remote end to reassemble a finished session
#[async_trait::async_trait]
pub trait FinalizeChannel: Send + Sync {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<()>;
}

/// Sends the finalize signal as a single HTTP POST
pub struct HttpFinalizer {
    client: reqwest::Client,
    url: String,
}

impl HttpFinalizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build finalize HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl FinalizeChannel for HttpFinalizer {
    async fn finalize(&self, request: &FinalizeRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Finalize request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Finalize request rejected with HTTP {}", status.as_u16());
        }

        info!(
            "Finalize acknowledged for {} ({} frames, {} bytes)",
            request.session_id, request.frame_count, request.byte_count
        );

        Ok(())
    }
}
