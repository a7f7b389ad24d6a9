use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info};

/// Live "transport usable" signal
#[derive(Clone)]
pub struct Reachability {
    rx: watch::Receiver<bool>,
}

impl Reachability {
    /// A signal driven by the returned sender
    pub fn manual(initial: bool) -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }

    pub fn is_usable(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Probes a host with TCP connects and publishes whether it is reachable.
///
/// The signal starts unusable until the first probe succeeds.
pub struct ReachabilityMonitor {
    tx: watch::Sender<bool>,
    target: String,
    interval: Duration,
    probe_timeout: Duration,
}

impl ReachabilityMonitor {
    /// Monitor `host:port`
    pub fn new(target: impl Into<String>, interval: Duration) -> (Self, Reachability) {
        let (tx, reachability) = Reachability::manual(false);
        let monitor = Self {
            tx,
            target: target.into(),
            interval,
            probe_timeout: Duration::from_secs(2),
        };
        (monitor, reachability)
    }

    /// Monitor the host serving `url`
    pub fn for_endpoint(url: &str, interval: Duration) -> Result<(Self, Reachability)> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid endpoint URL: {}", url))?;
        let host = parsed
            .host_str()
            .with_context(|| format!("Endpoint URL has no host: {}", url))?;
        let port = parsed
            .port_or_known_default()
            .with_context(|| format!("Endpoint URL has no port: {}", url))?;

        Ok(Self::new(format!("{}:{}", host, port), interval))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Probe once and publish the result
    pub async fn probe(&self) -> bool {
        let usable = matches!(
            timeout(self.probe_timeout, TcpStream::connect(self.target.as_str())).await,
            Ok(Ok(_))
        );

        let previous = self.tx.send_replace(usable);
        if previous != usable {
            info!("Network path to {} is now {}", self.target, if usable { "usable" } else { "unusable" });
        }

        usable
    }

    /// Probe on a fixed interval while `active` stays set
    pub async fn run(self, active: Arc<AtomicBool>) {
        debug!("Reachability monitor started for {}", self.target);

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while active.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.probe().await;
        }

        debug!("Reachability monitor stopped for {}", self.target);
    }
}
