//! Structured event journal.
//!
//! [`EventJournal`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! writes every received [`AnalysisEvent`] to the tracing log. It runs as a
//! long-lived background task and stops when cancelled or when the bus is
//! dropped.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::AnalysisEvent;

pub struct EventJournal;

impl EventJournal {
    /// Run the journal loop until `cancel` fires or the channel closes.
    ///
    /// Returns the number of events journaled.
    pub async fn run(
        mut receiver: broadcast::Receiver<AnalysisEvent>,
        cancel: CancellationToken,
    ) -> u64 {
        let mut journaled = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(journaled, "Event journal stopping");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => {
                        Self::write(&event);
                        journaled += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event journal lagged, some events were not logged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(journaled, "Event bus closed, journal shutting down");
                        break;
                    }
                },
            }
        }
        journaled
    }

    fn write(event: &AnalysisEvent) {
        tracing::info!(
            event_type = %event.event_type,
            session_id = ?event.session_id,
            athlete_id = ?event.athlete_id,
            payload = %event.payload,
            "Analysis event"
        );
    }
}
