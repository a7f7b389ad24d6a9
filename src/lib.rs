pub mod capture;
pub mod config;
pub mod http;
pub mod session;
pub mod stream;
pub mod telemetry;

pub use capture::{FileTailer, Frame, FrameAssembler};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{SessionConfig, SessionController, SessionError, SessionState, SessionStats};
pub use stream::{
    FinalizeChannel, FinalizeRequest, FrameMessage, FrameSink, HttpFinalizer, NatsConnector,
    StreamConnector, StreamTransport,
};
pub use telemetry::{
    DispatchOutcome, HttpTelemetrySink, MetricsStore, Reachability, ReachabilityMonitor,
    RetryPolicy, TelemetryDispatcher, TelemetrySample,
};
