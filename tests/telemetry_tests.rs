// Integration tests for telemetry delivery
//
// Retry and gating behaviour is checked against an in-memory sink; the HTTP
// sink and finalize channel are checked against a local axum server.

use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use capture_relay::stream::{FinalizeChannel, FinalizeRequest, HttpFinalizer};
use capture_relay::telemetry::{
    DeliveryError, DispatchOutcome, HttpTelemetrySink, Metric, MetricsStore, Reachability,
    ReachabilityMonitor, Readings, RetryPolicy, TelemetryDispatcher, TelemetrySample, TelemetrySink,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing_subscriber::fmt::MakeWriter;

/// Sink that fails the first `failures` calls and records every payload
struct ScriptedSink {
    failures: u32,
    calls: AtomicU32,
    payloads: Mutex<Vec<TelemetrySample>>,
}

impl ScriptedSink {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TelemetrySink for ScriptedSink {
    async fn deliver(&self, sample: &TelemetrySample) -> Result<(), DeliveryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().unwrap().push(sample.clone());
        if call <= self.failures {
            Err(DeliveryError::Status(503))
        } else {
            Ok(())
        }
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(5),
    }
}

fn sample() -> TelemetrySample {
    let mut readings = Readings::default();
    readings.set(Metric::HeartRate, 64.0);
    TelemetrySample::new(readings)
}

/// Collects formatted log output for the current thread
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn count(&self, level: &str, message: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(level) && line.contains(message))
            .count()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn dispatcher(sink: Arc<ScriptedSink>, reachable: bool) -> TelemetryDispatcher {
    let (_tx, reachability) = Reachability::manual(reachable);
    TelemetryDispatcher::new(sink, reachability, fast_policy(), Duration::from_millis(20))
}

#[tokio::test]
async fn test_always_failing_endpoint_gets_exactly_max_attempts() {
    let sink = ScriptedSink::new(u32::MAX);
    let dispatcher = dispatcher(Arc::clone(&sink), true);

    let outcome = dispatcher.dispatch(sample()).await;

    assert_eq!(outcome, DispatchOutcome::Dropped { attempts: 3 });
    assert_eq!(sink.calls(), 3);
}

#[tokio::test]
async fn test_dropped_sample_logs_a_single_warning() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    let sink = ScriptedSink::new(u32::MAX);
    let dispatcher = dispatcher(Arc::clone(&sink), true);
    dispatcher.dispatch(sample()).await;

    assert_eq!(logs.count("WARN", "Dropping telemetry sample"), 1);
    assert_eq!(logs.count("WARN", ""), 1, "unexpected warnings: {:?}", logs.lines());
    assert_eq!(logs.count("DEBUG", "Telemetry attempt"), 2);
}

#[tokio::test]
async fn test_stopped_dispatcher_does_not_blame_the_network() {
    let logs = LogBuffer::default();
    let _guard = logs.install();

    let sink = ScriptedSink::new(0);
    let dispatcher = dispatcher(Arc::clone(&sink), true);
    dispatcher.stop();

    assert_eq!(dispatcher.dispatch(sample()).await, DispatchOutcome::Skipped);
    assert_eq!(sink.calls(), 0);
    assert_eq!(logs.count("DEBUG", "dispatcher stopped"), 1);
    assert_eq!(logs.count("DEBUG", "Network unusable"), 0);
}

#[tokio::test]
async fn test_unreachable_network_makes_no_calls() {
    let sink = ScriptedSink::new(0);
    let dispatcher = dispatcher(Arc::clone(&sink), false);

    let outcome = dispatcher.dispatch(sample()).await;

    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn test_transient_failure_recovers_on_retry() {
    let sink = ScriptedSink::new(1);
    let dispatcher = dispatcher(Arc::clone(&sink), true);

    let outcome = dispatcher.dispatch(sample()).await;

    assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 2 });
    assert_eq!(sink.calls(), 2);
}

#[tokio::test]
async fn test_retries_reuse_the_same_payload() {
    let sink = ScriptedSink::new(2);
    let dispatcher = dispatcher(Arc::clone(&sink), true);

    dispatcher.dispatch(sample()).await;

    let payloads = sink.payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 3);
    assert!(payloads.windows(2).all(|p| p[0] == p[1]));
}

#[tokio::test]
async fn test_reachability_is_checked_per_dispatch() {
    let sink = ScriptedSink::new(0);
    let (tx, reachability) = Reachability::manual(false);
    let dispatcher = TelemetryDispatcher::new(
        Arc::clone(&sink) as Arc<dyn TelemetrySink>,
        reachability,
        fast_policy(),
        Duration::from_secs(5),
    );

    assert_eq!(dispatcher.dispatch(sample()).await, DispatchOutcome::Skipped);

    tx.send_replace(true);
    assert_eq!(
        dispatcher.dispatch(sample()).await,
        DispatchOutcome::Delivered { attempts: 1 }
    );
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn test_stop_abandons_pending_retry() {
    let sink = ScriptedSink::new(u32::MAX);
    let (_tx, reachability) = Reachability::manual(true);
    let dispatcher = TelemetryDispatcher::new(
        Arc::clone(&sink) as Arc<dyn TelemetrySink>,
        reachability,
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        },
        Duration::from_secs(5),
    );

    let running = dispatcher.clone();
    let handle = tokio::spawn(async move { running.dispatch(sample()).await });

    sleep(Duration::from_millis(50)).await;
    dispatcher.stop();

    assert_eq!(handle.await.unwrap(), DispatchOutcome::Abandoned { attempts: 1 });
    assert_eq!(sink.calls(), 1);
}

#[tokio::test]
async fn test_run_loop_sends_latest_readings_each_period() {
    let sink = ScriptedSink::new(0);
    let dispatcher = dispatcher(Arc::clone(&sink), true);
    let metrics = MetricsStore::new();
    metrics.record(Metric::Spo2, 97.0).await;

    let runner = dispatcher.clone();
    let store = metrics.clone();
    let handle = tokio::spawn(async move { runner.run(store).await });

    sleep(Duration::from_millis(50)).await;
    metrics.record(Metric::Distance, 1200.0).await;
    sleep(Duration::from_millis(60)).await;

    dispatcher.stop();
    handle.await.unwrap();

    let payloads = sink.payloads.lock().unwrap().clone();
    assert!(payloads.len() >= 3, "expected several ticks, got {}", payloads.len());
    assert!(payloads.iter().all(|p| p.readings.spo2 == Some(97.0)));
    assert_eq!(payloads.first().unwrap().readings.distance, None);
    assert_eq!(payloads.last().unwrap().readings.distance, Some(1200.0));
}

// ============================================================================
// HTTP endpoints
// ============================================================================

#[derive(Clone)]
struct EndpointState {
    status: StatusCode,
    bodies: Arc<Mutex<Vec<serde_json::Value>>>,
}

async fn record_body(
    State(state): State<EndpointState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state.bodies.lock().unwrap().push(body);
    state.status
}

async fn spawn_endpoint(status: StatusCode) -> Result<(String, Arc<Mutex<Vec<serde_json::Value>>>)> {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/health-data", post(record_body))
        .route("/finalize", post(record_body))
        .with_state(EndpointState {
            status,
            bodies: Arc::clone(&bodies),
        });

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok((format!("http://{}", addr), bodies))
}

#[tokio::test]
async fn test_http_sink_posts_only_present_fields() -> Result<()> {
    let (base, bodies) = spawn_endpoint(StatusCode::OK).await?;
    let sink = HttpTelemetrySink::new(format!("{}/health-data", base), Duration::from_secs(5))?;

    let mut readings = Readings::default();
    readings.set(Metric::HeartRate, 71.0);
    readings.set(Metric::Latitude, 38.72);
    sink.deliver(&TelemetrySample::new(readings)).await?;

    let bodies = bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let body = bodies[0].as_object().unwrap();
    assert_eq!(body["heart_rate"], 71.0);
    assert_eq!(body["latitude"], 38.72);
    assert!(body.contains_key("timestamp"));
    assert!(!body.contains_key("spo2"));
    assert!(!body.contains_key("longitude"));

    Ok(())
}

#[tokio::test]
async fn test_http_sink_server_error_is_retried_then_dropped() -> Result<()> {
    let (base, bodies) = spawn_endpoint(StatusCode::INTERNAL_SERVER_ERROR).await?;
    let sink = HttpTelemetrySink::new(format!("{}/health-data", base), Duration::from_secs(5))?;
    let (_tx, reachability) = Reachability::manual(true);
    let dispatcher = TelemetryDispatcher::new(Arc::new(sink), reachability, fast_policy(), Duration::from_secs(5));

    let outcome = dispatcher.dispatch(sample()).await;

    assert_eq!(outcome, DispatchOutcome::Dropped { attempts: 3 });
    assert_eq!(bodies.lock().unwrap().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_http_sink_reports_network_error() -> Result<()> {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let sink = HttpTelemetrySink::new(format!("http://{}/health-data", addr), Duration::from_secs(2))?;
    let result = sink.deliver(&sample()).await;

    assert!(matches!(result, Err(DeliveryError::Network(_))));

    Ok(())
}

#[tokio::test]
async fn test_http_finalizer_success_and_rejection() -> Result<()> {
    let request = FinalizeRequest {
        session_id: "capture-test".to_string(),
        frame_count: 3,
        byte_count: 5000,
        timestamp: "2024-10-01T12:00:00Z".to_string(),
    };

    let (base, bodies) = spawn_endpoint(StatusCode::OK).await?;
    let finalizer = HttpFinalizer::new(format!("{}/finalize", base), Duration::from_secs(5))?;
    finalizer.finalize(&request).await?;
    assert_eq!(bodies.lock().unwrap()[0]["byte_count"], 5000);

    let (base, _) = spawn_endpoint(StatusCode::SERVICE_UNAVAILABLE).await?;
    let finalizer = HttpFinalizer::new(format!("{}/finalize", base), Duration::from_secs(5))?;
    assert!(finalizer.finalize(&request).await.is_err());

    Ok(())
}

// ============================================================================
// Reachability
// ============================================================================

#[tokio::test]
async fn test_monitor_reports_listening_host_usable() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let (monitor, reachability) = ReachabilityMonitor::new(addr.to_string(), Duration::from_secs(1));
    assert!(!reachability.is_usable(), "starts unusable until probed");

    assert!(monitor.probe().await);
    assert!(reachability.is_usable());

    drop(listener);
    assert!(!monitor.probe().await);
    assert!(!reachability.is_usable());

    Ok(())
}

#[test]
fn test_monitor_target_from_endpoint_url() -> Result<()> {
    let (monitor, _) =
        ReachabilityMonitor::for_endpoint("http://192.168.1.218:5001/health-data", Duration::from_secs(5))?;
    assert_eq!(monitor.target(), "192.168.1.218:5001");

    let (monitor, _) = ReachabilityMonitor::for_endpoint("https://example.com/ingest", Duration::from_secs(5))?;
    assert_eq!(monitor.target(), "example.com:443");

    assert!(ReachabilityMonitor::for_endpoint("not a url", Duration::from_secs(5)).is_err());

    Ok(())
}
