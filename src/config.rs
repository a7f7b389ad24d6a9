use anyhow::{bail, Result};
use std::path::PathBuf;
use serde::Deserialize;
use std::time::Duration;

use crate::session::SessionConfig;
use crate::telemetry::RetryPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub recordings_path: String,
    pub poll_interval_ms: u64,
    pub frame_capacity: usize,
    pub read_ceiling: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub nats_url: String,
    pub subject_prefix: String,
    pub finalize_url: String,
    pub connect_timeout_secs: u64,
    pub finalize_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub period_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub probe_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "capture-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5080,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            recordings_path: "recordings".to_string(),
            poll_interval_ms: session.poll_interval.as_millis() as u64,
            frame_capacity: session.frame_capacity,
            read_ceiling: session.read_ceiling,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "capture".to_string(),
            finalize_url: "http://localhost:5001/finalize".to_string(),
            connect_timeout_secs: 5,
            finalize_timeout_secs: 10,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            enabled: true,
            endpoint: "http://localhost:5001/health-data".to_string(),
            period_secs: 5,
            max_attempts: retry.max_attempts,
            backoff_ms: retry.backoff.as_millis() as u64,
            request_timeout_secs: 10,
            probe_interval_secs: 5,
        }
    }
}

impl CaptureConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            frame_capacity: self.frame_capacity,
            read_ceiling: self.read_ceiling,
            recordings_dir: (!self.recordings_path.is_empty()).then(|| PathBuf::from(&self.recordings_path)),
        }
    }
}

impl TelemetryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate understands, extension optional),
    /// then apply `CAPTURE_RELAY__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("CAPTURE_RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the runtime loops cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.capture.poll_interval_ms == 0 {
            bail!("capture.poll_interval_ms must be greater than zero");
        }
        if self.telemetry.period_secs == 0 {
            bail!("telemetry.period_secs must be greater than zero");
        }
        if self.telemetry.probe_interval_secs == 0 {
            bail!("telemetry.probe_interval_secs must be greater than zero");
        }
        Ok(())
    }
}
