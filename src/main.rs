use anyhow::{Context, Result};
use capture_relay::{
    create_router, AppState, Config, HttpFinalizer, HttpTelemetrySink, MetricsStore,
    NatsConnector, ReachabilityMonitor, SessionController, TelemetryDispatcher,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capture-relay", version, about = "Stream growing recordings and biometric telemetry")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/capture-relay")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control API and the telemetry loop
    Serve,
    /// Stream one growing recording file until Ctrl-C
    Stream {
        /// File the recorder is appending to
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Capture Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Stream endpoint: {} (finalize via {})", cfg.stream.nats_url, cfg.stream.finalize_url);

    let controller = Arc::new(build_controller(&cfg)?);

    match cli.command {
        Command::Serve => serve(cfg, controller).await,
        Command::Stream { file } => stream_file(controller, file).await,
    }
}

fn build_controller(cfg: &Config) -> Result<SessionController> {
    let connector = NatsConnector::new(cfg.stream.nats_url.clone(), cfg.stream.subject_prefix.clone())
        .with_connect_timeout(Duration::from_secs(cfg.stream.connect_timeout_secs));
    let finalizer = HttpFinalizer::new(
        cfg.stream.finalize_url.clone(),
        Duration::from_secs(cfg.stream.finalize_timeout_secs),
    )?;

    Ok(SessionController::new(
        cfg.capture.session_config(),
        Arc::new(connector),
        Arc::new(finalizer),
    ))
}

async fn serve(cfg: Config, controller: Arc<SessionController>) -> Result<()> {
    let metrics = MetricsStore::new();
    let monitoring = Arc::new(AtomicBool::new(true));

    let dispatcher = if cfg.telemetry.enabled {
        let (monitor, reachability) = ReachabilityMonitor::for_endpoint(
            &cfg.telemetry.endpoint,
            Duration::from_secs(cfg.telemetry.probe_interval_secs),
        )?;
        info!("Watching network path to {}", monitor.target());
        tokio::spawn(monitor.run(Arc::clone(&monitoring)));

        let sink = HttpTelemetrySink::new(
            cfg.telemetry.endpoint.clone(),
            Duration::from_secs(cfg.telemetry.request_timeout_secs),
        )?;
        info!("Telemetry endpoint: {}", sink.url());

        let dispatcher = TelemetryDispatcher::new(
            Arc::new(sink),
            reachability,
            cfg.telemetry.retry_policy(),
            Duration::from_secs(cfg.telemetry.period_secs),
        );

        let runner = dispatcher.clone();
        let store = metrics.clone();
        tokio::spawn(async move { runner.run(store).await });

        Some(dispatcher)
    } else {
        info!("Telemetry disabled");
        None
    };

    let app = create_router(AppState::new(Arc::clone(&controller), metrics));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");

    // Finalize whatever is still streaming
    controller.stop().await;

    if let Some(dispatcher) = dispatcher {
        dispatcher.stop();
    }
    monitoring.store(false, Ordering::SeqCst);

    Ok(())
}

async fn stream_file(controller: Arc<SessionController>, file: PathBuf) -> Result<()> {
    let stats = controller.start(file.clone()).await?;

    info!(
        "Streaming {} as {} (Ctrl-C to stop)",
        file.display(),
        stats.session_id.as_deref().unwrap_or_default()
    );

    shutdown_signal().await;

    if let Some(stats) = controller.stop().await {
        info!(
            "Streamed {} bytes in {} frames (finalized={})",
            stats.bytes_consumed, stats.frames_sent, stats.finalized
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
}
