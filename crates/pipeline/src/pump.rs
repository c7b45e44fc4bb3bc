//! The frame pump: one task per session, one frame in flight.
//!
//! Each iteration requests the next frame, runs it through pose detection,
//! angle extraction and classification, appends the result to the history
//! and fans it out to observers, alert sinks and render surfaces. The next
//! frame is only requested once the previous one is fully processed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use smashguard_core::error::CoreError;
use smashguard_core::landmark::PoseFrame;
use tokio_util::sync::CancellationToken;

use crate::controller::{lock, Inner, SessionParts, StopReason};
use crate::error::SessionError;
use crate::source::{FrameUpdate, OverlayAngle, OverlayFrame, RawFrame};

/// How the pump task ended.
pub(crate) enum PumpExit {
    /// A stop request cancelled the pump; the stopper tears down.
    Cancelled(Box<SessionParts>),
    /// Input ended and the pump already tore the session down.
    Finished,
}

enum Tick {
    Cancelled,
    Frame(Option<RawFrame>),
}

pub(crate) async fn run(
    inner: Arc<Inner>,
    mut parts: SessionParts,
    cancel: CancellationToken,
) -> PumpExit {
    let session_id = parts.session.id;
    tracing::debug!(%session_id, "Frame pump started");

    loop {
        let tick = tokio::select! {
            biased;
            _ = cancel.cancelled() => Tick::Cancelled,
            frame = parts.source.next_frame() => Tick::Frame(frame),
        };

        match tick {
            Tick::Cancelled => return PumpExit::Cancelled(Box::new(parts)),
            Tick::Frame(None) => break,
            Tick::Frame(Some(frame)) => {
                if let Err(e) = process_frame(&inner, &mut parts, &frame, &cancel).await {
                    tracing::debug!(
                        %session_id,
                        sequence = frame.sequence,
                        error = %e,
                        "Skipping frame"
                    );
                }
            }
        }
    }

    tracing::info!(%session_id, frames = parts.frames_processed, "End of input");

    // Claim the teardown unless a stop request got here first.
    if !inner.claim_end_of_input() {
        return PumpExit::Cancelled(Box::new(parts));
    }
    inner.teardown(parts, StopReason::EndOfInput).await;
    PumpExit::Finished
}

async fn process_frame(
    inner: &Inner,
    parts: &mut SessionParts,
    frame: &RawFrame,
    cancel: &CancellationToken,
) -> Result<(), SessionError> {
    let landmarks = parts
        .engine
        .detect(frame)
        .await
        .map_err(|e| SessionError::Classification(CoreError::Internal(e.to_string())))?;
    if cancel.is_cancelled() {
        return Ok(());
    }
    let Some(landmarks) = landmarks else {
        tracing::trace!(sequence = frame.sequence, "No subject in frame");
        return Ok(());
    };

    let pose = PoseFrame::new(landmarks, frame.captured_at);
    let limbs = inner.extractor.extract(&pose)?;
    let snapshot = inner.classifier.classify_set(limbs.combined(), frame.captured_at);
    let full_body_detected = pose.is_full_body_visible(inner.extractor.confidence_threshold());

    lock(&inner.history).append(snapshot.clone());
    if snapshot.overall_risk.is_some() {
        parts.samples.push(snapshot.clone());
    }
    parts.frames_processed += 1;

    let update = FrameUpdate {
        session_id: parts.session.id,
        overall_risk: snapshot.overall_risk,
        full_body_detected,
        metrics: snapshot,
    };
    for observer in inner.observers() {
        guarded("observer", || observer.on_frame(&update));
    }

    if let Some(alert) = parts.dispatcher.on_snapshot(&update.metrics) {
        tracing::warn!(
            session_id = %update.session_id,
            joints = ?alert.at_risk_joints,
            "High injury risk detected"
        );
        for sink in &inner.sinks {
            guarded("sink", || sink.notify(&alert));
        }
    }

    if !inner.surfaces.is_empty() {
        let overlay = OverlayFrame {
            sequence: frame.sequence,
            angles: inner
                .extractor
                .overlay(&pose)?
                .into_iter()
                .map(|(joint, side, degrees)| OverlayAngle {
                    joint,
                    side,
                    degrees,
                })
                .collect(),
            landmarks: pose.landmarks,
            overall_risk: update.overall_risk,
        };
        for surface in &inner.surfaces {
            guarded("surface", || surface.draw_overlay(&overlay));
        }
    }

    Ok(())
}

/// Run a consumer callback. A panic is logged and does not unwind the pump,
/// which still owns the session's source and engine.
fn guarded(consumer: &'static str, callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!(
            consumer,
            panic = panic_message(payload.as_ref()),
            "Frame consumer panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
