//! Session lifecycle state machine.
//!
//! [`SessionController`] owns the pose engine, the frame source of the
//! running session and the render surfaces. It moves them into the frame
//! pump task for the duration of a session and takes them back on stop.
//!
//! Lifecycle: `Stopped -> Starting(mode) -> Active(mode) -> Stopping ->
//! Stopped`. `start` is only accepted from `Stopped`. `stop` is accepted
//! from every state and always converges to `Stopped`; a stop that arrives
//! while the input is still being acquired is honoured as soon as the
//! acquisition returns, and whatever it opened is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use smashguard_core::angle::AngleExtractor;
use smashguard_core::event_names::{
    EVENT_SESSION_RECORDED, EVENT_SESSION_STARTED, EVENT_SESSION_START_FAILED,
    EVENT_SESSION_STOPPED,
};
use smashguard_core::history::{MetricsHistory, SessionStats};
use smashguard_core::risk::{ClassifiedSnapshot, RiskClassifier};
use smashguard_core::session_summary::{SessionInfo, SessionSummary};
use smashguard_core::types::{InputMode, SessionId, Timestamp};
use smashguard_events::alert::AlertDispatcher;
use smashguard_events::bus::{AnalysisEvent, EventBus};
use smashguard_events::delivery::session_record::SessionRecorder;
use smashguard_events::sink::NotificationSink;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::{AcquisitionError, SessionError};
use crate::pump::{self, PumpExit};
use crate::source::{
    validate_dimensions, validate_request, CaptureProvider, FrameSource, FrameUpdate,
    InputRequest, PoseEngine, RenderSurface,
};
use crate::state::SessionState;

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Receives every classified frame of every session.
pub trait SnapshotObserver: Send + Sync {
    fn on_frame(&self, update: &FrameUpdate);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ---------------------------------------------------------------------------
// Session-scoped resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub(crate) struct Session {
    pub id: SessionId,
    pub mode: InputMode,
    pub started_at: Timestamp,
}

/// Everything the pump task owns while a session runs.
pub(crate) struct SessionParts {
    pub session: Session,
    pub source: Box<dyn FrameSource>,
    pub engine: Box<dyn PoseEngine>,
    pub dispatcher: AlertDispatcher,
    /// Frames with an overall tier, used for the session summary.
    pub samples: Vec<ClassifiedSnapshot>,
    pub frames_processed: u64,
}

struct PumpHandle {
    cancel: CancellationToken,
    join: JoinHandle<PumpExit>,
}

struct Lifecycle {
    state: SessionState,
    session_id: Option<SessionId>,
    pump: Option<PumpHandle>,
}

struct EngineSlot {
    engine: Option<Box<dyn PoseEngine>>,
    initialized: bool,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Requested,
    EndOfInput,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            StopReason::Requested => "requested",
            StopReason::EndOfInput => "end_of_input",
        }
    }
}

/// Lock a std mutex, recovering the data from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) struct Inner {
    pub config: PipelineConfig,
    pub extractor: AngleExtractor,
    pub classifier: RiskClassifier,
    capture: Arc<dyn CaptureProvider>,
    engine: Mutex<EngineSlot>,
    pub surfaces: Vec<Arc<dyn RenderSurface>>,
    pub sinks: Vec<Arc<dyn NotificationSink>>,
    recorder: Option<Arc<dyn SessionRecorder>>,
    bus: Option<Arc<EventBus>>,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn SnapshotObserver>)>>,
    next_subscription: AtomicU64,
    pub history: Mutex<MetricsHistory>,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<SessionState>,
}

impl Inner {
    fn set_state(&self, lifecycle: &mut Lifecycle, state: SessionState) {
        tracing::debug!(from = %lifecycle.state, to = %state, "Session state change");
        lifecycle.state = state;
        self.state_tx.send_replace(state);
    }

    fn publish(&self, event: AnalysisEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event.with_athlete(self.config.athlete_id));
        }
    }

    pub fn clear_surfaces(&self) {
        for surface in &self.surfaces {
            surface.clear();
        }
    }

    pub fn observers(&self) -> Vec<Arc<dyn SnapshotObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn return_engine(&self, engine: Box<dyn PoseEngine>) {
        lock(&self.engine).engine = Some(engine);
    }

    /// Take the engine out of its slot, initialising it on first use.
    async fn checkout_engine(&self) -> Result<Box<dyn PoseEngine>, SessionError> {
        let (mut engine, initialized) = {
            let mut slot = lock(&self.engine);
            let engine = slot
                .engine
                .take()
                .ok_or_else(|| SessionError::EngineInit("pose engine is in use".into()))?;
            (engine, slot.initialized)
        };
        if initialized {
            return Ok(engine);
        }

        let timeout = self.config.acquisition_timeout;
        match tokio::time::timeout(timeout, engine.initialize(&self.config.engine)).await {
            Ok(Ok(())) => {
                tracing::info!("Pose engine initialised");
                lock(&self.engine).initialized = true;
                Ok(engine)
            }
            Ok(Err(e)) => {
                self.return_engine(engine);
                Err(SessionError::EngineInit(e.to_string()))
            }
            Err(_) => {
                self.return_engine(engine);
                Err(SessionError::EngineInit(format!(
                    "timed out after {} s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// At end of input, move `Active` to `Stopping` on the pump's behalf.
    ///
    /// Returns `false` when a stop request already owns the teardown.
    pub fn claim_end_of_input(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if !lifecycle.state.is_analyzing() {
            return false;
        }
        // The handle belongs to the pump calling this.
        lifecycle.pump = None;
        self.set_state(&mut lifecycle, SessionState::Stopping);
        true
    }

    fn stop_requested(&self) -> bool {
        lock(&self.lifecycle).state.is_stopping()
    }

    /// Release everything a session owned and settle in `Stopped`.
    pub async fn teardown(&self, mut parts: SessionParts, reason: StopReason) {
        parts.source.release().await;
        self.clear_surfaces();
        let SessionParts {
            session,
            engine,
            samples,
            frames_processed,
            ..
        } = parts;
        self.return_engine(engine);

        let ended_at = Utc::now();
        self.record_session(&session, ended_at, &samples);

        tracing::info!(
            session_id = %session.id,
            mode = %session.mode,
            frames_processed,
            samples = samples.len(),
            reason = reason.as_str(),
            "Analysis session stopped"
        );
        self.publish(
            AnalysisEvent::new(EVENT_SESSION_STOPPED)
                .with_session(session.id)
                .with_payload(serde_json::json!({
                    "mode": session.mode,
                    "reason": reason.as_str(),
                    "frames_processed": frames_processed,
                    "samples": samples.len(),
                })),
        );

        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.pump = None;
        lifecycle.session_id = None;
        self.set_state(&mut lifecycle, SessionState::Stopped);
    }

    /// Summarise the session and hand it to the recorder in the background.
    fn record_session(&self, session: &Session, ended_at: Timestamp, samples: &[ClassifiedSnapshot]) {
        let info = SessionInfo {
            session_id: session.id,
            athlete_id: self.config.athlete_id,
            mode: session.mode,
            started_at: session.started_at,
            ended_at,
        };
        let Some(summary) =
            SessionSummary::from_samples(info, samples, self.config.min_session_samples)
        else {
            tracing::debug!(
                session_id = %session.id,
                samples = samples.len(),
                "Session too short to record"
            );
            return;
        };
        let Some(recorder) = self.recorder.clone() else {
            return;
        };

        let bus = self.bus.clone();
        tokio::spawn(async move {
            match recorder.record(&summary).await {
                Ok(()) => {
                    if let Some(bus) = bus {
                        bus.publish(
                            AnalysisEvent::new(EVENT_SESSION_RECORDED)
                                .with_session(summary.session_id)
                                .with_athlete(summary.athlete_id)
                                .with_payload(serde_json::json!({
                                    "sample_count": summary.sample_count,
                                    "overall_score": summary.overall_score,
                                })),
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %summary.session_id,
                        error = %e,
                        "Failed to record session summary"
                    );
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Handle to the analysis pipeline. Cheap to clone; all clones drive the
/// same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

pub struct SessionControllerBuilder {
    config: PipelineConfig,
    capture: Arc<dyn CaptureProvider>,
    engine: Box<dyn PoseEngine>,
    surfaces: Vec<Arc<dyn RenderSurface>>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    recorder: Option<Arc<dyn SessionRecorder>>,
    bus: Option<Arc<EventBus>>,
}

impl SessionControllerBuilder {
    pub fn surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.surfaces.push(surface);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn SessionRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> SessionController {
        let (state_tx, _) = watch::channel(SessionState::Stopped);
        let inner = Inner {
            extractor: AngleExtractor::new(self.config.confidence_threshold),
            classifier: RiskClassifier::new(self.config.risk_tolerance_deg),
            history: Mutex::new(MetricsHistory::with_capacity(self.config.history_capacity)),
            config: self.config,
            capture: self.capture,
            engine: Mutex::new(EngineSlot {
                engine: Some(self.engine),
                initialized: false,
            }),
            surfaces: self.surfaces,
            sinks: self.sinks,
            recorder: self.recorder,
            bus: self.bus,
            observers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Stopped,
                session_id: None,
                pump: None,
            }),
            state_tx,
        };
        SessionController {
            inner: Arc::new(inner),
        }
    }
}

impl SessionController {
    pub fn builder(
        config: PipelineConfig,
        capture: Arc<dyn CaptureProvider>,
        engine: Box<dyn PoseEngine>,
    ) -> SessionControllerBuilder {
        SessionControllerBuilder {
            config,
            capture,
            engine,
            surfaces: Vec::new(),
            sinks: Vec::new(),
            recorder: None,
            bus: None,
        }
    }

    // -- lifecycle -----------------------------------------------------------

    /// Open `request` and start analysing it.
    ///
    /// Returns the new session's id once the frame pump is running. On any
    /// failure the controller is back in `Stopped` before this returns.
    ///
    /// The start sequence runs as its own task and completes even if the
    /// returned future is dropped; a later `stop` then converges as usual.
    pub async fn start(&self, request: InputRequest) -> Result<SessionId, SessionError> {
        let mode = request.mode();
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if !lifecycle.state.is_stopped() {
                return Err(SessionError::AlreadyRunning);
            }
            self.inner.set_state(&mut lifecycle, SessionState::Starting(mode));
        }
        tracing::info!(%mode, "Starting analysis session");

        let controller = self.clone();
        let task = tokio::spawn(async move { controller.run_start(request, mode).await });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(%mode, error = %e, "Session start task failed");
                let mut lifecycle = lock(&self.inner.lifecycle);
                lifecycle.session_id = None;
                self.inner.set_state(&mut lifecycle, SessionState::Stopped);
                Err(SessionError::Internal(e.to_string()))
            }
        }
    }

    async fn run_start(&self, request: InputRequest, mode: InputMode) -> Result<SessionId, SessionError> {
        match self.try_start(request, mode).await {
            Ok(session_id) => Ok(session_id),
            Err(e) => {
                {
                    let mut lifecycle = lock(&self.inner.lifecycle);
                    self.inner.set_state(&mut lifecycle, SessionState::Stopped);
                }
                if matches!(e, SessionError::Cancelled) {
                    tracing::info!(%mode, "Session start cancelled");
                } else {
                    tracing::warn!(%mode, error = %e, "Session start failed");
                    self.inner.publish(
                        AnalysisEvent::new(EVENT_SESSION_START_FAILED).with_payload(
                            serde_json::json!({
                                "mode": mode,
                                "error": e.to_string(),
                                "retriable": e.is_retriable(),
                            }),
                        ),
                    );
                }
                Err(e)
            }
        }
    }

    async fn try_start(&self, request: InputRequest, mode: InputMode) -> Result<SessionId, SessionError> {
        let inner = &self.inner;
        validate_request(&request, inner.config.max_video_bytes)?;
        inner.clear_surfaces();

        let engine = inner.checkout_engine().await?;
        if inner.stop_requested() {
            inner.return_engine(engine);
            return Err(SessionError::Cancelled);
        }

        let timeout = inner.config.acquisition_timeout;
        let mut source = match tokio::time::timeout(timeout, inner.capture.open(&request)).await {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => {
                inner.return_engine(engine);
                return Err(e.into());
            }
            Err(_) => {
                inner.return_engine(engine);
                if inner.stop_requested() {
                    return Err(SessionError::Cancelled);
                }
                return Err(AcquisitionError::Timeout(timeout.as_secs()).into());
            }
        };

        if inner.stop_requested() {
            source.release().await;
            inner.return_engine(engine);
            return Err(SessionError::Cancelled);
        }
        if let Err(e) = validate_dimensions(mode, source.dimensions(), inner.config.min_video_dimension) {
            source.release().await;
            inner.return_engine(engine);
            return Err(e.into());
        }

        let session = Session {
            id: uuid::Uuid::now_v7(),
            mode,
            started_at: Utc::now(),
        };
        let mut dispatcher = AlertDispatcher::new();
        dispatcher.reset(Some(session.id));
        let parts = SessionParts {
            session,
            source,
            engine,
            dispatcher,
            samples: Vec::new(),
            frames_processed: 0,
        };

        // Final stop check and hand-over happen under one lock: a concurrent
        // stop either sees `Active` with a pump to join or has already
        // flagged `Stopping`.
        let rejected = {
            let mut lifecycle = lock(&inner.lifecycle);
            if lifecycle.state == SessionState::Starting(mode) {
                tracing::info!(session_id = %session.id, %mode, "Analysis session active");
                inner.publish(
                    AnalysisEvent::new(EVENT_SESSION_STARTED)
                        .with_session(session.id)
                        .with_payload(serde_json::json!({ "mode": mode })),
                );
                let cancel = CancellationToken::new();
                let join = tokio::spawn(pump::run(Arc::clone(inner), parts, cancel.clone()));
                lifecycle.pump = Some(PumpHandle { cancel, join });
                lifecycle.session_id = Some(session.id);
                inner.set_state(&mut lifecycle, SessionState::Active(mode));
                None
            } else {
                Some(parts)
            }
        };
        if let Some(mut parts) = rejected {
            parts.source.release().await;
            inner.return_engine(parts.engine);
            return Err(SessionError::Cancelled);
        }

        Ok(session.id)
    }

    /// Stop whatever is running and wait until the controller is `Stopped`.
    ///
    /// Calling `stop` on a stopped controller does nothing.
    pub async fn stop(&self) {
        enum Action {
            Nothing,
            Wait,
            Join(PumpHandle),
        }

        let action = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            match lifecycle.state {
                SessionState::Stopped => Action::Nothing,
                SessionState::Stopping => Action::Wait,
                SessionState::Starting(_) => {
                    self.inner.set_state(&mut lifecycle, SessionState::Stopping);
                    Action::Wait
                }
                SessionState::Active(_) => {
                    self.inner.set_state(&mut lifecycle, SessionState::Stopping);
                    match lifecycle.pump.take() {
                        Some(handle) => Action::Join(handle),
                        None => Action::Wait,
                    }
                }
            }
        };

        match action {
            Action::Nothing => {}
            Action::Wait => self.wait_for_stopped().await,
            Action::Join(handle) => {
                handle.cancel.cancel();
                match handle.join.await {
                    Ok(PumpExit::Cancelled(parts)) => {
                        self.inner.teardown(*parts, StopReason::Requested).await;
                    }
                    Ok(PumpExit::Finished) => self.wait_for_stopped().await,
                    Err(e) => {
                        tracing::error!(error = %e, "Frame pump task failed");
                        self.inner.clear_surfaces();
                        let mut lifecycle = lock(&self.inner.lifecycle);
                        lifecycle.session_id = None;
                        self.inner.set_state(&mut lifecycle, SessionState::Stopped);
                    }
                }
            }
        }
    }

    async fn wait_for_stopped(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        // The sender lives as long as `inner`, so this only ends on `Stopped`.
        let _ = rx.wait_for(SessionState::is_stopped).await;
    }

    // -- state ---------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        lock(&self.inner.lifecycle).state
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    pub fn is_analyzing(&self) -> bool {
        self.state().is_analyzing()
    }

    pub fn is_stopping(&self) -> bool {
        self.state().is_stopping()
    }

    pub fn current_mode(&self) -> Option<InputMode> {
        self.state().current_mode()
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        lock(&self.inner.lifecycle).session_id
    }

    // -- observers -----------------------------------------------------------

    pub fn subscribe(&self, observer: Arc<dyn SnapshotObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Returns whether `id` was subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self
            .inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    // -- history -------------------------------------------------------------

    /// Copy of the rolling history, oldest first.
    pub fn history_snapshot(&self) -> Vec<ClassifiedSnapshot> {
        lock(&self.inner.history).to_vec()
    }

    pub fn latest_snapshot(&self) -> Option<ClassifiedSnapshot> {
        lock(&self.inner.history).latest().cloned()
    }

    pub fn clear_metrics(&self) {
        lock(&self.inner.history).clear();
    }

    pub fn session_stats(&self) -> SessionStats {
        lock(&self.inner.history).session_stats()
    }

    /// Run `f` against the history without copying it.
    pub fn with_history<R>(&self, f: impl FnOnce(&MetricsHistory) -> R) -> R {
        f(&lock(&self.inner.history))
    }
}
