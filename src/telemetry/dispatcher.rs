use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::reachability::Reachability;
use super::sample::{MetricsStore, TelemetrySample};
use super::sink::{DeliveryError, TelemetrySink};

/// Shortest sampling period the dispatcher will tick at
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Bounded retry settings for telemetry delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls per sample, the first attempt included
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// One sample on its way to the endpoint. The payload is fixed for every retry.
#[derive(Debug)]
pub struct DeliveryAttempt {
    payload: TelemetrySample,
    attempts: u32,
    max_attempts: u32,
    backoff: Duration,
}

impl DeliveryAttempt {
    pub fn new(payload: TelemetrySample, policy: &RetryPolicy) -> Self {
        Self {
            payload,
            attempts: 0,
            max_attempts: policy.max_attempts.max(1),
            backoff: policy.backoff,
        }
    }

    pub fn payload(&self) -> &TelemetrySample {
        &self.payload
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Make the next attempt
    async fn send(&mut self, sink: &dyn TelemetrySink) -> Result<(), DeliveryError> {
        self.attempts += 1;
        sink.deliver(&self.payload).await
    }
}

/// Result of dispatching one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Network reported unusable, nothing was sent
    Skipped,
    /// The endpoint acknowledged the sample
    Delivered { attempts: u32 },
    /// Every attempt failed and the sample was dropped
    Dropped { attempts: u32 },
    /// The dispatcher was stopped between retries
    Abandoned { attempts: u32 },
}

/// Periodically packages the latest readings and delivers them best-effort.
///
/// Sends are gated on reachability: when the path is unusable the tick is
/// skipped and never replayed. Each dispatch runs in its own task so a
/// retrying send never delays the next sampling tick.
#[derive(Clone)]
pub struct TelemetryDispatcher {
    sink: Arc<dyn TelemetrySink>,
    reachability: Reachability,
    policy: RetryPolicy,
    period: Duration,
    active: Arc<AtomicBool>,
}

impl TelemetryDispatcher {
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        reachability: Reachability,
        policy: RetryPolicy,
        period: Duration,
    ) -> Self {
        Self {
            sink,
            reachability,
            policy,
            period,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop the sampling loop and abandon pending retries
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Deliver one sample with bounded retry
    pub async fn dispatch(&self, sample: TelemetrySample) -> DispatchOutcome {
        if !self.is_active() {
            debug!("Telemetry dispatcher stopped, skipping sample");
            return DispatchOutcome::Skipped;
        }
        if !self.reachability.is_usable() {
            debug!("Network unusable, skipping telemetry sample");
            return DispatchOutcome::Skipped;
        }

        let mut attempt = DeliveryAttempt::new(sample, &self.policy);

        loop {
            match attempt.send(self.sink.as_ref()).await {
                Ok(()) => {
                    debug!(
                        "Telemetry sent ({} readings, attempt {})",
                        attempt.payload().readings.present(),
                        attempt.attempts()
                    );
                    return DispatchOutcome::Delivered {
                        attempts: attempt.attempts(),
                    };
                }
                Err(e) if !attempt.can_retry() => {
                    warn!(
                        "Dropping telemetry sample after {} attempts: {}",
                        attempt.attempts(),
                        e
                    );
                    return DispatchOutcome::Dropped {
                        attempts: attempt.attempts(),
                    };
                }
                Err(e) => {
                    debug!(
                        "Telemetry attempt {}/{} failed: {}, retrying in {:?}",
                        attempt.attempts(),
                        attempt.max_attempts,
                        e,
                        attempt.backoff
                    );
                }
            }

            tokio::time::sleep(attempt.backoff).await;

            if !self.is_active() {
                debug!("Telemetry dispatcher stopped, abandoning retry");
                return DispatchOutcome::Abandoned {
                    attempts: attempt.attempts(),
                };
            }
        }
    }

    /// Sample `metrics` every period until stopped
    pub async fn run(&self, metrics: MetricsStore) {
        info!(
            "Telemetry dispatcher started (every {:?}, {} attempts per sample)",
            self.period, self.policy.max_attempts
        );

        let mut ticker = tokio::time::interval(self.period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !self.is_active() {
                break;
            }

            let sample = metrics.snapshot().await;
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(sample).await;
            });
        }

        info!("Telemetry dispatcher stopped");
    }
}
