use super::config::{SessionConfig, MIN_POLL_INTERVAL};
use super::error::SessionError;
use super::stats::{SessionState, SessionStats};
use crate::capture::{FileTailer, Frame, FrameAssembler};
use crate::stream::{FinalizeChannel, FinalizeRequest, FrameSender, StreamConnector, StreamTransport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Drives capture sessions: at most one is active at a time.
///
/// `start()` opens a fresh stream connection and spawns the poll loop that
/// tails the recording file. `stop()` lets the loop finish, drains the
/// transport queue, sends the finalize signal on its own channel and only
/// then disconnects.
pub struct SessionController {
    /// Capture configuration shared by every session
    config: SessionConfig,

    /// Opens the stream connection for each session
    connector: Arc<dyn StreamConnector>,

    /// Delivers the end-of-stream signal
    finalizer: Arc<dyn FinalizeChannel>,

    /// Current lifecycle state, readable without taking the session lock
    state: watch::Sender<SessionState>,

    /// Serializes start/stop/arm
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    armed: Option<PathBuf>,
    active: Option<ActiveSession>,
    last: Option<SessionStats>,
}

struct ActiveSession {
    session_id: String,
    location: PathBuf,
    started_at: DateTime<Utc>,
    capturing: Arc<AtomicBool>,
    progress: Arc<CaptureProgress>,
    capture_task: JoinHandle<()>,
    transport: StreamTransport,
}

#[derive(Default)]
struct CaptureProgress {
    bytes_consumed: AtomicU64,
    frames_queued: AtomicU64,
}

impl ActiveSession {
    fn stats(&self, state: SessionState) -> SessionStats {
        SessionStats {
            state,
            session_id: Some(self.session_id.clone()),
            location: Some(self.location.clone()),
            started_at: Some(self.started_at),
            bytes_consumed: self.progress.bytes_consumed.load(Ordering::SeqCst),
            frames_sent: self.progress.frames_queued.load(Ordering::SeqCst),
            finalized: false,
        }
    }
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn StreamConnector>,
        finalizer: Arc<dyn FinalizeChannel>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            connector,
            finalizer,
            state,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Record where the next session will read from
    pub async fn arm(&self, location: impl Into<PathBuf>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let state = self.state();
        if !matches!(state, SessionState::Idle | SessionState::Armed) {
            warn!("Cannot arm capture while {}", state);
            return Err(SessionError::NotArmable(state));
        }

        let location = self.config.resolve(&location.into());
        info!("Capture armed for {}", location.display());
        inner.armed = Some(location);
        self.state.send_replace(SessionState::Armed);
        Ok(())
    }

    /// Start streaming the location given to `arm()`
    pub async fn start_armed(&self) -> Result<SessionStats, SessionError> {
        let location = {
            let inner = self.inner.lock().await;
            inner.armed.clone()
        };
        match location {
            Some(location) => self.start(location).await,
            None => Err(SessionError::NoLocation),
        }
    }

    /// Start a capture session on `location`
    pub async fn start(&self, location: impl Into<PathBuf>) -> Result<SessionStats, SessionError> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if inner.active.is_some() || matches!(state, SessionState::Active | SessionState::Finalizing) {
            warn!("Capture session already {}, ignoring start", state);
            return Err(SessionError::AlreadyActive(state));
        }

        let location = self.config.resolve(&location.into());
        let session_id = format!("capture-{}", uuid::Uuid::new_v4());
        info!("Starting capture session {} on {}", session_id, location.display());

        let transport = match StreamTransport::connect(self.connector.as_ref(), &session_id).await {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to start capture session {}: {:#}", session_id, e);
                return Err(SessionError::Connect(e));
            }
        };

        let Some(sender) = transport.sender() else {
            return Err(SessionError::Connect(anyhow::anyhow!("Transport queue unavailable")));
        };

        let capturing = Arc::new(AtomicBool::new(true));
        let progress = Arc::new(CaptureProgress::default());

        let capture_task = tokio::spawn(capture_loop(
            session_id.clone(),
            FileTailer::new(&location, self.config.read_ceiling),
            FrameAssembler::new(self.config.frame_capacity),
            sender,
            Arc::clone(&capturing),
            Arc::clone(&progress),
            self.config.poll_interval,
        ));

        let active = ActiveSession {
            session_id,
            location,
            started_at: Utc::now(),
            capturing,
            progress,
            capture_task,
            transport,
        };
        let stats = active.stats(SessionState::Active);

        inner.active = Some(active);
        self.state.send_replace(SessionState::Active);

        info!("Capture session started successfully");

        Ok(stats)
    }

    /// Stop the active session and signal end-of-stream.
    ///
    /// Returns `None` when there was nothing to stop.
    pub async fn stop(&self) -> Option<SessionStats> {
        let mut inner = self.inner.lock().await;

        let Some(active) = inner.active.take() else {
            debug!("No active capture session, ignoring stop");
            return None;
        };

        self.state.send_replace(SessionState::Finalizing);
        info!("Stopping capture session: {}", active.session_id);

        // The loop observes this on its next tick, finishes any poll in
        // flight and drains the file before flushing the assembler.
        active.capturing.store(false, Ordering::SeqCst);

        let ActiveSession {
            session_id,
            location,
            started_at,
            progress,
            capture_task,
            mut transport,
            ..
        } = active;

        if let Err(e) = capture_task.await {
            error!("Capture task panicked: {}", e);
        }

        // Every frame must be on the wire before the finalize signal goes out
        let frames_sent = match transport.drain().await {
            Ok(sent) => sent,
            Err(e) => {
                error!("Failed to drain transport for {}: {:#}", session_id, e);
                progress.frames_queued.load(Ordering::SeqCst)
            }
        };
        let bytes_consumed = progress.bytes_consumed.load(Ordering::SeqCst);

        let request = FinalizeRequest {
            session_id: session_id.clone(),
            frame_count: frames_sent,
            byte_count: bytes_consumed,
            timestamp: Utc::now().to_rfc3339(),
        };

        let finalized = match self.finalizer.finalize(&request).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to finalize capture session {}: {:#}", session_id, e);
                false
            }
        };

        if let Err(e) = transport.disconnect().await {
            warn!("Failed to disconnect transport for {}: {:#}", session_id, e);
        }

        let stats = SessionStats {
            state: SessionState::Idle,
            session_id: Some(session_id),
            location: Some(location),
            started_at: Some(started_at),
            bytes_consumed,
            frames_sent,
            finalized,
        };

        info!(
            "Capture session stopped: {} bytes in {} frames (finalized={})",
            stats.bytes_consumed, stats.frames_sent, stats.finalized
        );

        inner.armed = None;
        inner.last = Some(stats.clone());
        self.state.send_replace(SessionState::Idle);

        Some(stats)
    }

    /// Current session statistics.
    ///
    /// While a stop is in progress only the state is reported.
    pub fn status(&self) -> SessionStats {
        let state = self.state();
        let Ok(inner) = self.inner.try_lock() else {
            return SessionStats::idle(state, None);
        };

        match &inner.active {
            Some(active) => active.stats(state),
            None => match (&inner.armed, &inner.last) {
                (Some(location), _) => SessionStats::idle(state, Some(location.clone())),
                (None, Some(last)) => SessionStats {
                    state,
                    ..last.clone()
                },
                (None, None) => SessionStats::idle(state, None),
            },
        }
    }
}

async fn capture_loop(
    session_id: String,
    mut tailer: FileTailer,
    mut assembler: FrameAssembler,
    sender: FrameSender,
    capturing: Arc<AtomicBool>,
    progress: Arc<CaptureProgress>,
    poll_interval: Duration,
) {
    info!(
        "Capture loop started for {} (poll every {:?}, {} byte frames)",
        session_id,
        poll_interval,
        assembler.capacity()
    );

    let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !capturing.load(Ordering::SeqCst) {
            break;
        }

        if let Err(e) = poll_once(&mut tailer, &mut assembler, &sender, &progress, u64::MAX).await {
            warn!("Poll failed for {}, retrying next tick: {:#}", session_id, e);
        }
    }

    // Pick up everything on storage when the stop was observed. Bytes the
    // recorder appends after that point belong to no session.
    match tailer.file_len().await {
        Ok(end) => loop {
            match poll_once(&mut tailer, &mut assembler, &sender, &progress, end).await {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Final poll failed for {}: {:#}", session_id, e);
                    break;
                }
            }
        },
        Err(e) => warn!("Cannot size {} for the final drain: {:#}", session_id, e),
    }

    if let Some(frame) = assembler.flush() {
        debug!("Flushing final {} byte frame for {}", frame.len(), session_id);
        forward(&sender, &progress, frame);
    }

    info!(
        "Capture loop stopped for {} ({} bytes, {} frames)",
        session_id,
        tailer.offset(),
        assembler.frames_emitted()
    );
}

async fn poll_once(
    tailer: &mut FileTailer,
    assembler: &mut FrameAssembler,
    sender: &FrameSender,
    progress: &CaptureProgress,
    end: u64,
) -> Result<usize> {
    let bytes = tailer.poll_until(end).await?;
    if bytes.is_empty() {
        return Ok(0);
    }

    progress.bytes_consumed.store(tailer.offset(), Ordering::SeqCst);
    for frame in assembler.push(&bytes) {
        forward(sender, progress, frame);
    }

    Ok(bytes.len())
}

fn forward(sender: &FrameSender, progress: &CaptureProgress, frame: Frame) {
    match sender.send(frame) {
        Ok(()) => {
            progress.frames_queued.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => error!("{:#}", e),
    }
}
