//! Best-effort delivery of periodic biometric telemetry
//!
//! Samples are snapshots of the latest known readings. Delivery is skipped
//! while the network path is unusable and retried a bounded number of times
//! otherwise.

pub mod dispatcher;
pub mod reachability;
pub mod sample;
pub mod sink;

pub use dispatcher::{DeliveryAttempt, DispatchOutcome, RetryPolicy, TelemetryDispatcher};
pub use reachability::{Reachability, ReachabilityMonitor};
pub use sample::{Metric, MetricsStore, Readings, TelemetrySample};
pub use sink::{DeliveryError, HttpTelemetrySink, TelemetrySink, DEFAULT_REQUEST_TIMEOUT};
