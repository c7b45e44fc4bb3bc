//! Drives one replay session from start to teardown.

use std::future::Future;
use std::time::Duration;

use smashguard_core::event_names::{EVENT_SESSION_RECORDED, EVENT_SESSION_STOPPED};
use smashguard_core::types::SessionId;
use smashguard_events::bus::AnalysisEvent;
use smashguard_pipeline::{InputRequest, SessionController, SessionError, SessionState};
use tokio::sync::broadcast;

/// Start `request` and wait until the session stops on its own or
/// `shutdown` resolves, in which case the session is stopped.
pub async fn drive<S>(
    controller: &SessionController,
    request: InputRequest,
    shutdown: S,
) -> Result<SessionId, SessionError>
where
    S: Future<Output = ()>,
{
    let session_id = controller.start(request).await?;
    tracing::info!(%session_id, "Replay started");

    let mut state = controller.watch_state();
    tokio::select! {
        _ = shutdown => {
            tracing::info!(%session_id, "Shutdown requested, stopping session");
            controller.stop().await;
        }
        result = state.wait_for(SessionState::is_stopped) => {
            if result.is_err() {
                tracing::warn!(%session_id, "Session state channel closed");
            }
        }
    }
    Ok(session_id)
}

/// Wait for the background recording of `session_id` to be acknowledged.
///
/// Returns `false` without waiting when the session had fewer than
/// `min_samples` measured frames, and `false` if no acknowledgement
/// arrives within `timeout`.
pub async fn await_recording(
    events: &mut broadcast::Receiver<AnalysisEvent>,
    session_id: SessionId,
    min_samples: usize,
    timeout: Duration,
) -> bool {
    let wait = async {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            };
            if event.session_id != Some(session_id) {
                continue;
            }
            match event.event_type.as_str() {
                EVENT_SESSION_STOPPED => {
                    let samples = event.payload["samples"].as_u64().unwrap_or(0) as usize;
                    if samples < min_samples {
                        tracing::info!(%session_id, samples, "Session too short to record");
                        return false;
                    }
                }
                EVENT_SESSION_RECORDED => return true,
                _ => {}
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(recorded) => recorded,
        Err(_) => {
            tracing::warn!(%session_id, "Timed out waiting for session to be recorded");
            false
        }
    }
}
