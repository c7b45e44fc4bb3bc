//! Integration tests for the session controller lifecycle.
//!
//! Every external collaborator is mocked (see `common`), so the tests
//! exercise the state machine, the frame pump and the cleanup guarantees
//! end to end.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use smashguard_core::event_names::{EVENT_SESSION_STARTED, EVENT_SESSION_STOPPED};
use smashguard_core::risk::RiskTier;
use smashguard_core::types::InputMode;
use smashguard_events::bus::EventBus;
use smashguard_pipeline::{
    AcquisitionError, InputRequest, PipelineConfig, SessionController, SessionError, SessionState,
};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Test: stop is idempotent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_on_idle_controller_is_noop() {
    let h = harness(MockEngine::new(vec![]), vec![]);
    h.controller.stop().await;
    h.controller.stop().await;
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert_eq!(h.capture.released(), 0);
}

#[tokio::test]
async fn stop_twice_after_running_session() {
    let h = harness(
        MockEngine::new(vec![150.0; 3]),
        vec![OpenBehaviour::held_open(3)],
    );
    h.controller.start(InputRequest::camera()).await.expect("start");
    assert_eq!(h.controller.state(), SessionState::Active(InputMode::Camera));

    h.controller.stop().await;
    h.controller.stop().await;

    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert_eq!(h.capture.released(), 1);
    assert!(h.surface.clears.load(Ordering::SeqCst) >= 2, "cleared on start and stop");
    assert_eq!(h.controller.current_session_id(), None);
}

// ---------------------------------------------------------------------------
// Test: stop during acquisition
// ---------------------------------------------------------------------------

/// A stop that arrives while the capture provider is still opening the
/// input converges to `Stopped` and releases what was opened exactly once.
#[tokio::test]
async fn stop_during_acquisition_releases_once() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        MockEngine::new(vec![]),
        vec![OpenBehaviour::Gated(Arc::clone(&gate))],
    );

    let starter = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.start(InputRequest::camera()).await })
    };
    h.capture.entered.notified().await;
    assert!(h.controller.is_loading());

    let stopper = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.stop().await })
    };
    wait_for_state(&h.controller, SessionState::Stopping).await;
    assert!(h.controller.is_stopping());

    gate.notify_one();

    assert_matches!(starter.await.unwrap(), Err(SessionError::Cancelled));
    stopper.await.unwrap();
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert_eq!(h.capture.released(), 1);
    assert_eq!(h.observer.count(), 0);
}

/// Dropping the `start` future mid-acquisition leaves the start sequence
/// running; a later stop still converges and the controller stays usable.
#[tokio::test]
async fn abandoned_start_can_still_be_stopped_and_restarted() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        MockEngine::new(vec![]),
        vec![OpenBehaviour::Gated(Arc::clone(&gate)), OpenBehaviour::held_open(0)],
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        h.controller.start(InputRequest::camera()),
    )
    .await;
    assert!(abandoned.is_err(), "start is still acquiring");
    h.capture.entered.notified().await;
    assert!(h.controller.is_loading());

    let stopper = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.stop().await })
    };
    wait_for_state(&h.controller, SessionState::Stopping).await;
    gate.notify_one();

    tokio::time::timeout(Duration::from_secs(1), stopper)
        .await
        .expect("stop completes")
        .unwrap();
    assert_eq!(h.controller.state(), SessionState::Stopped);
    assert_eq!(h.capture.released(), 1);

    h.controller.start(InputRequest::camera()).await.expect("restart succeeds");
    assert!(h.controller.is_analyzing());
    h.controller.stop().await;
    assert_eq!(h.capture.released(), 2);
}

/// An acquisition timeout that lands after a stop request reports the
/// cancellation, not the timeout.
#[tokio::test(start_paused = true)]
async fn acquisition_timeout_after_stop_is_cancelled() {
    let h = harness(MockEngine::new(vec![]), vec![OpenBehaviour::Hang]);
    let starter = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.start(InputRequest::camera()).await })
    };
    h.capture.entered.notified().await;

    let stopper = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.stop().await })
    };
    wait_for_state(&h.controller, SessionState::Stopping).await;

    assert_matches!(starter.await.unwrap(), Err(SessionError::Cancelled));
    stopper.await.unwrap();
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

// ---------------------------------------------------------------------------
// Test: re-entrant start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_while_active_is_rejected() {
    let h = harness(
        MockEngine::new(vec![]),
        vec![OpenBehaviour::held_open(0), OpenBehaviour::held_open(0)],
    );
    h.controller.start(InputRequest::camera()).await.expect("start");

    let second = h
        .controller
        .start(InputRequest::video("clip.mp4", "video/mp4", 1024))
        .await;
    assert_matches!(second, Err(SessionError::AlreadyRunning));
    assert_eq!(h.controller.current_mode(), Some(InputMode::Camera));
    assert_eq!(h.capture.opened(), 1);

    h.controller.stop().await;
    assert_eq!(h.capture.released(), 1);
}

#[tokio::test]
async fn start_while_starting_is_rejected() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        MockEngine::new(vec![]),
        vec![OpenBehaviour::Gated(Arc::clone(&gate))],
    );
    let starter = {
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.start(InputRequest::camera()).await })
    };
    h.capture.entered.notified().await;

    assert_matches!(
        h.controller.start(InputRequest::camera()).await,
        Err(SessionError::AlreadyRunning)
    );

    gate.notify_one();
    starter.await.unwrap().expect("first start succeeds");
    h.controller.stop().await;
}

// ---------------------------------------------------------------------------
// Test: acquisition and engine failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn acquisition_failure_returns_to_stopped_and_can_retry() {
    let h = harness(
        MockEngine::new(vec![]),
        vec![
            OpenBehaviour::Fail(AcquisitionError::CameraUnavailable("in use".into())),
            OpenBehaviour::held_open(0),
        ],
    );

    let err = h.controller.start(InputRequest::camera()).await.unwrap_err();
    assert_matches!(err, SessionError::Acquisition(AcquisitionError::CameraUnavailable(_)));
    assert!(err.is_retriable());
    assert_eq!(h.controller.state(), SessionState::Stopped);

    h.controller.start(InputRequest::camera()).await.expect("retry succeeds");
    assert!(h.controller.is_analyzing());
    h.controller.stop().await;
    assert_eq!(h.init_calls.load(Ordering::SeqCst), 1, "engine initialised once");
}

#[tokio::test]
async fn permission_denied_is_not_retriable() {
    let h = harness(
        MockEngine::new(vec![]),
        vec![OpenBehaviour::Fail(AcquisitionError::PermissionDenied)],
    );
    let err = h.controller.start(InputRequest::camera()).await.unwrap_err();
    assert!(!err.is_retriable());
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

#[tokio::test]
async fn engine_init_failure_skips_acquisition() {
    let h = harness(
        MockEngine::new(vec![]).with_init(InitBehaviour::Fail),
        vec![OpenBehaviour::held_open(0)],
    );
    let err = h.controller.start(InputRequest::camera()).await.unwrap_err();
    assert_matches!(err, SessionError::EngineInit(msg) if msg.contains("model failed"));
    assert_eq!(h.capture.opened(), 0);
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn acquisition_timeout_fails_closed() {
    let h = harness(MockEngine::new(vec![]), vec![OpenBehaviour::Hang]);
    let err = h.controller.start(InputRequest::camera()).await.unwrap_err();
    assert_matches!(err, SessionError::Acquisition(AcquisitionError::Timeout(10)));
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn engine_init_timeout_fails_closed() {
    let h = harness(
        MockEngine::new(vec![]).with_init(InitBehaviour::Hang),
        vec![OpenBehaviour::held_open(0)],
    );
    let err = h.controller.start(InputRequest::camera()).await.unwrap_err();
    assert_matches!(err, SessionError::EngineInit(msg) if msg.contains("timed out"));
    assert_eq!(h.capture.opened(), 0);
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

// ---------------------------------------------------------------------------
// Test: video input validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_video_upload_is_rejected_before_opening() {
    let h = harness(MockEngine::new(vec![]), vec![OpenBehaviour::frames(1)]);
    let err = h
        .controller
        .start(InputRequest::video("notes.txt", "text/plain", 10))
        .await
        .unwrap_err();
    assert_matches!(err, SessionError::Acquisition(AcquisitionError::UnsupportedFormat(_)));
    assert_eq!(h.capture.opened(), 0);
}

#[tokio::test]
async fn tiny_video_is_released_and_rejected() {
    let h = harness(
        MockEngine::new(vec![]),
        vec![OpenBehaviour::Frames {
            frames: 5,
            dimensions: (64, 64),
            hold_open: false,
        }],
    );
    let err = h
        .controller
        .start(InputRequest::video("tiny.mp4", "video/mp4", 2048))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        SessionError::Acquisition(AcquisitionError::InvalidDimensions { width: 64, height: 64 })
    );
    assert_eq!(h.capture.released(), 1);
    assert_eq!(h.controller.state(), SessionState::Stopped);
}

// ---------------------------------------------------------------------------
// Test: natural end of input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_of_video_self_stops() {
    let h = harness(MockEngine::new(vec![150.0; 3]), vec![OpenBehaviour::frames(3)]);
    h.controller
        .start(InputRequest::video("rally.mp4", "video/mp4", 4096))
        .await
        .expect("start");

    wait_until_stopped(&h.controller).await;

    assert_eq!(h.capture.released(), 1);
    assert_eq!(h.observer.count(), 3);
    assert_eq!(h.surface.draws.load(Ordering::SeqCst), 3);
    assert_eq!(h.controller.history_snapshot().len(), 3);

    // Stopping afterwards is a no-op.
    h.controller.stop().await;
    assert_eq!(h.capture.released(), 1);
}

// ---------------------------------------------------------------------------
// Test: per-frame failures are skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_frames_are_skipped() {
    let engine = MockEngine::new(vec![150.0, 150.0, 150.0, 150.0, 150.0])
        .failing_on(&[1])
        .malformed_on(&[3]);
    let h = harness(engine, vec![OpenBehaviour::frames(5)]);
    h.controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&h.controller).await;

    assert_eq!(h.controller.history_snapshot().len(), 3);
    assert_eq!(h.observer.count(), 3);
}

#[tokio::test]
async fn frames_without_subject_are_not_classified() {
    // The engine only knows two frames; the rest report no subject.
    let h = harness(MockEngine::new(vec![150.0, 150.0]), vec![OpenBehaviour::frames(6)]);
    h.controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&h.controller).await;
    assert_eq!(h.controller.history_snapshot().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: alerts and session recording
// ---------------------------------------------------------------------------

/// A deepening knee bend stays `HighRisk` for six frames and raises one
/// alert on entry. A `MediumRisk` frame ends the episode, so the next
/// `HighRisk` frame alerts again. The session is recorded.
#[tokio::test]
async fn high_risk_episodes_alert_once_each_and_session_is_recorded() {
    let mut knees = vec![150.0; 3];
    knees.extend(knee_ramp(60.0, 40.0, 6));
    knees.push(135.0);
    knees.extend([50.0, 45.0]);
    let n = knees.len();

    let mut h = harness(MockEngine::new(knees.clone()), vec![OpenBehaviour::frames(n)]);
    let session_id = h.controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&h.controller).await;

    let tiers: Vec<_> = h
        .controller
        .history_snapshot()
        .iter()
        .map(|s| s.overall_risk)
        .collect();
    let mut expected = vec![Some(RiskTier::Safe); 3];
    expected.extend(vec![Some(RiskTier::HighRisk); 6]);
    expected.push(Some(RiskTier::MediumRisk));
    expected.extend(vec![Some(RiskTier::HighRisk); 2]);
    assert_eq!(tiers, expected);

    let alerts = h.sink.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 2, "one alert per high-risk episode");
    assert!(alerts.iter().all(|a| a.session_id == Some(session_id)));
    let alert_knees: Vec<f64> = alerts
        .iter()
        .map(|a| a.angles.knee_angle.expect("knee measured"))
        .collect();
    assert!((alert_knees[0] - knees[3]).abs() < 1e-6);
    assert!((alert_knees[1] - knees[10]).abs() < 1e-6);

    let summary = tokio::time::timeout(Duration::from_secs(5), h.recordings.recv())
        .await
        .expect("recorder called")
        .expect("summary sent");
    assert_eq!(summary.session_id, session_id);
    assert_eq!(summary.sample_count, n);
    assert_eq!(summary.mode, InputMode::Camera);
}

#[tokio::test]
async fn short_session_is_not_recorded() {
    let mut h = harness(MockEngine::new(vec![150.0; 5]), vec![OpenBehaviour::frames(5)]);
    h.controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&h.controller).await;

    let recorded = tokio::time::timeout(Duration::from_millis(200), h.recordings.recv()).await;
    assert!(recorded.is_err(), "five samples must not be recorded");
}

// ---------------------------------------------------------------------------
// Test: misbehaving consumers
// ---------------------------------------------------------------------------

/// A panicking observer neither starves the other observers nor loses the
/// session's source and engine.
#[tokio::test]
async fn panicking_observer_does_not_leak_session_resources() {
    let h = harness(
        MockEngine::new(vec![150.0; 3]),
        vec![OpenBehaviour::frames(3), OpenBehaviour::held_open(0)],
    );
    h.controller.subscribe(Arc::new(PanickingObserver));

    h.controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&h.controller).await;

    assert_eq!(h.capture.released(), 1);
    assert_eq!(h.observer.count(), 3);
    assert_eq!(h.controller.history_snapshot().len(), 3);

    h.controller.start(InputRequest::camera()).await.expect("engine was returned");
    h.controller.stop().await;
    assert_eq!(h.capture.released(), 2);
}

// ---------------------------------------------------------------------------
// Test: history across sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_persists_across_sessions_until_cleared() {
    let h = harness(
        MockEngine::new(vec![150.0; 4]),
        vec![OpenBehaviour::frames(4), OpenBehaviour::frames(4)],
    );
    for _ in 0..2 {
        h.controller.start(InputRequest::camera()).await.expect("start");
        wait_until_stopped(&h.controller).await;
    }
    assert_eq!(h.controller.history_snapshot().len(), 8);
    assert_eq!(h.controller.session_stats().total_sessions, 8);

    h.controller.clear_metrics();
    assert!(h.controller.history_snapshot().is_empty());
    assert!(h.controller.latest_snapshot().is_none());
}

// ---------------------------------------------------------------------------
// Test: observers and events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsubscribed_observer_receives_nothing() {
    let h = harness(MockEngine::new(vec![150.0; 3]), vec![OpenBehaviour::frames(3)]);
    let extra = Arc::new(RecordingObserver::default());
    let id = h.controller.subscribe(extra.clone());
    assert!(h.controller.unsubscribe(id));
    assert!(!h.controller.unsubscribe(id));

    h.controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&h.controller).await;

    assert_eq!(extra.count(), 0);
    assert_eq!(h.observer.count(), 3);
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let capture = MockCapture::new(vec![OpenBehaviour::frames(2)]);
    let controller = SessionController::builder(
        PipelineConfig::default(),
        capture.clone(),
        Box::new(MockEngine::new(vec![150.0, 150.0])),
    )
    .event_bus(Arc::clone(&bus))
    .build();

    let session_id = controller.start(InputRequest::camera()).await.expect("start");
    wait_until_stopped(&controller).await;

    let started = rx.recv().await.expect("started event");
    assert_eq!(started.event_type, EVENT_SESSION_STARTED);
    assert_eq!(started.session_id, Some(session_id));

    let stopped = rx.recv().await.expect("stopped event");
    assert_eq!(stopped.event_type, EVENT_SESSION_STOPPED);
    assert_eq!(stopped.payload["reason"], "end_of_input");
    assert_eq!(stopped.payload["frames_processed"], 2);
}
