//! Shared mocks for the session controller tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use smashguard_core::landmark::{index, Landmark, LANDMARK_COUNT};
use smashguard_core::session_summary::SessionSummary;
use smashguard_events::alert::RiskAlert;
use smashguard_events::delivery::session_record::SessionRecorder;
use smashguard_events::delivery::DeliveryError;
use smashguard_events::sink::NotificationSink;
use smashguard_pipeline::{
    AcquisitionError, CaptureProvider, EngineConfig, EngineError, FrameSource, FrameUpdate,
    InputRequest, OverlayFrame, PipelineConfig, PoseEngine, RawFrame, RenderSurface,
    SessionController, SessionState, SnapshotObserver,
};
use tokio::sync::{mpsc, Notify};

// ---------------------------------------------------------------------------
// Landmarks
// ---------------------------------------------------------------------------

/// 33 landmarks where only the left hip/knee/ankle are visible and the
/// knee's interior angle is `knee_deg` (`0..=180`; larger values fold back).
pub fn knee_only_landmarks(knee_deg: f64) -> Vec<Landmark> {
    let mut landmarks = vec![Landmark::new(0.0, 0.0, 0.0); LANDMARK_COUNT];
    let theta = knee_deg.to_radians();
    landmarks[index::LEFT_HIP] = Landmark::new(0.5, 0.3, 0.95);
    landmarks[index::LEFT_KNEE] = Landmark::new(0.5, 0.5, 0.95);
    landmarks[index::LEFT_ANKLE] =
        Landmark::new(0.5 + 0.2 * theta.sin(), 0.5 - 0.2 * theta.cos(), 0.95);
    landmarks
}

/// Knee angles rising linearly from `from` to `to` over `n` frames.
pub fn knee_ramp(from: f64, to: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| from + (to - from) * i as f64 / (n - 1).max(1) as f64)
        .collect()
}

// ---------------------------------------------------------------------------
// Frame source
// ---------------------------------------------------------------------------

pub struct MockSource {
    frames: VecDeque<RawFrame>,
    dimensions: (u32, u32),
    /// Pend forever once the frames run out instead of ending the input.
    hold_open: bool,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for MockSource {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    async fn next_frame(&mut self) -> Option<RawFrame> {
        tokio::task::yield_now().await;
        match self.frames.pop_front() {
            Some(frame) => Some(frame),
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    async fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn raw_frame(sequence: u64, (width, height): (u32, u32)) -> RawFrame {
    RawFrame {
        sequence,
        width,
        height,
        captured_at: Utc::now(),
        pixels: Arc::from(Vec::<u8>::new()),
    }
}

// ---------------------------------------------------------------------------
// Capture provider
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum OpenBehaviour {
    /// Open a source with `frames` frames.
    Frames {
        frames: usize,
        dimensions: (u32, u32),
        hold_open: bool,
    },
    /// Wait for `gate` before opening a held-open source.
    Gated(Arc<Notify>),
    Fail(AcquisitionError),
    /// Never complete.
    Hang,
}

impl OpenBehaviour {
    pub fn frames(frames: usize) -> Self {
        OpenBehaviour::Frames {
            frames,
            dimensions: (640, 480),
            hold_open: false,
        }
    }

    pub fn held_open(frames: usize) -> Self {
        OpenBehaviour::Frames {
            frames,
            dimensions: (640, 480),
            hold_open: true,
        }
    }
}

pub struct MockCapture {
    behaviours: Mutex<VecDeque<OpenBehaviour>>,
    pub opened: AtomicUsize,
    pub entered: Notify,
    pub released: Arc<AtomicUsize>,
}

impl MockCapture {
    pub fn new(behaviours: Vec<OpenBehaviour>) -> Arc<Self> {
        Arc::new(Self {
            behaviours: Mutex::new(behaviours.into()),
            opened: AtomicUsize::new(0),
            entered: Notify::new(),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn source(&self, frames: usize, dimensions: (u32, u32), hold_open: bool) -> Box<dyn FrameSource> {
        Box::new(MockSource {
            frames: (0..frames as u64).map(|i| raw_frame(i, dimensions)).collect(),
            dimensions,
            hold_open,
            released: Arc::clone(&self.released),
        })
    }
}

#[async_trait]
impl CaptureProvider for MockCapture {
    async fn open(&self, _request: &InputRequest) -> Result<Box<dyn FrameSource>, AcquisitionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| OpenBehaviour::frames(0));
        match behaviour {
            OpenBehaviour::Frames {
                frames,
                dimensions,
                hold_open,
            } => Ok(self.source(frames, dimensions, hold_open)),
            OpenBehaviour::Gated(gate) => {
                gate.notified().await;
                Ok(self.source(0, (640, 480), true))
            }
            OpenBehaviour::Fail(e) => Err(e),
            OpenBehaviour::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Pose engine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum InitBehaviour {
    Ok,
    Fail,
    Hang,
}

/// Returns knee-only landmarks whose angle is `knees[sequence]`.
pub struct MockEngine {
    knees: Vec<f64>,
    init: InitBehaviour,
    /// Sequences for which detection fails.
    fail_on: HashSet<u64>,
    /// Sequences for which the engine returns a truncated landmark list.
    malformed_on: HashSet<u64>,
    pub init_calls: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new(knees: Vec<f64>) -> Self {
        Self {
            knees,
            init: InitBehaviour::Ok,
            fail_on: HashSet::new(),
            malformed_on: HashSet::new(),
            init_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_init(mut self, init: InitBehaviour) -> Self {
        self.init = init;
        self
    }

    pub fn failing_on(mut self, sequences: &[u64]) -> Self {
        self.fail_on.extend(sequences);
        self
    }

    pub fn malformed_on(mut self, sequences: &[u64]) -> Self {
        self.malformed_on.extend(sequences);
        self
    }
}

#[async_trait]
impl PoseEngine for MockEngine {
    async fn initialize(&mut self, _config: &EngineConfig) -> Result<(), EngineError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        match self.init {
            InitBehaviour::Ok => Ok(()),
            InitBehaviour::Fail => Err(EngineError("model failed to load".into())),
            InitBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn detect(&mut self, frame: &RawFrame) -> Result<Option<Vec<Landmark>>, EngineError> {
        if self.fail_on.contains(&frame.sequence) {
            return Err(EngineError("inference failed".into()));
        }
        if self.malformed_on.contains(&frame.sequence) {
            return Ok(Some(vec![Landmark::new(0.5, 0.5, 1.0); 10]));
        }
        Ok(self
            .knees
            .get(frame.sequence as usize)
            .map(|&knee| knee_only_landmarks(knee)))
    }
}

// ---------------------------------------------------------------------------
// Consumers
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingObserver {
    pub updates: Mutex<Vec<FrameUpdate>>,
}

impl RecordingObserver {
    pub fn count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

impl SnapshotObserver for RecordingObserver {
    fn on_frame(&self, update: &FrameUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

/// Panics on every frame.
pub struct PanickingObserver;

impl SnapshotObserver for PanickingObserver {
    fn on_frame(&self, _update: &FrameUpdate) {
        panic!("observer failure");
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub alerts: Mutex<Vec<RiskAlert>>,
}

impl NotificationSink for CollectingSink {
    fn notify(&self, alert: &RiskAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

#[derive(Default)]
pub struct CountingSurface {
    pub clears: AtomicUsize,
    pub draws: AtomicUsize,
}

impl RenderSurface for CountingSurface {
    fn draw_overlay(&self, _frame: &OverlayFrame) {
        self.draws.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ChannelRecorder {
    tx: mpsc::UnboundedSender<SessionSummary>,
}

impl ChannelRecorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SessionSummary>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl SessionRecorder for ChannelRecorder {
    async fn record(&self, summary: &SessionSummary) -> Result<(), DeliveryError> {
        let _ = self.tx.send(summary.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub controller: SessionController,
    pub capture: Arc<MockCapture>,
    pub surface: Arc<CountingSurface>,
    pub sink: Arc<CollectingSink>,
    pub observer: Arc<RecordingObserver>,
    pub recordings: mpsc::UnboundedReceiver<SessionSummary>,
    pub init_calls: Arc<AtomicUsize>,
}

pub fn harness(engine: MockEngine, behaviours: Vec<OpenBehaviour>) -> Harness {
    let capture = MockCapture::new(behaviours);
    let surface = Arc::new(CountingSurface::default());
    let sink = Arc::new(CollectingSink::default());
    let observer = Arc::new(RecordingObserver::default());
    let (recorder, recordings) = ChannelRecorder::new();
    let init_calls = Arc::clone(&engine.init_calls);

    let controller = SessionController::builder(
        PipelineConfig::default(),
        capture.clone(),
        Box::new(engine),
    )
    .surface(surface.clone())
    .sink(sink.clone())
    .recorder(recorder)
    .build();
    controller.subscribe(observer.clone());

    Harness {
        controller,
        capture,
        surface,
        sink,
        observer,
        recordings,
        init_calls,
    }
}

/// Wait (bounded) until the controller settles in `Stopped`.
pub async fn wait_until_stopped(controller: &SessionController) {
    let mut rx = controller.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(SessionState::is_stopped))
        .await
        .expect("controller should stop")
        .expect("state channel open");
}

/// Wait (bounded) until the controller reaches `state`.
pub async fn wait_for_state(controller: &SessionController, state: SessionState) {
    let mut rx = controller.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("controller should reach state")
        .expect("state channel open");
}
