//! `smashguard-replay` -- offline injury-risk analysis of a recorded rally.
//!
//! Loads a JSON-lines landmark recording, plays it through the session
//! pipeline as a video upload and logs the resulting risk summary. Alerts
//! are logged and optionally forwarded to a webhook; the session summary
//! is posted to the backend when one is configured.
//!
//! # Environment variables
//!
//! | Variable            | Required | Default  | Description                              |
//! |---------------------|----------|----------|------------------------------------------|
//! | `REPLAY_PATH`       | yes      | --       | Recording to replay                      |
//! | `BACKEND_URL`       | no       | --       | Backend base URL for session records     |
//! | `ALERT_WEBHOOK_URL` | no       | --       | Endpoint receiving high-risk alerts      |
//! | `REPLAY_REALTIME`   | no       | `false`  | Pace frames at the recorded frame rate   |
//! | `LOG_FORMAT`        | no       | `pretty` | `json` for structured log lines          |
//!
//! Pipeline settings (`CONFIDENCE_THRESHOLD`, `ATHLETE_ID`, ...) are read
//! by `PipelineConfig::from_env`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use smashguard_agent::config::{AgentConfig, LogFormat};
use smashguard_agent::replay::{PassthroughEngine, Recording, ReplayCaptureProvider};
use smashguard_agent::report::ReplayReport;
use smashguard_agent::runner;
use smashguard_events::delivery::session_record::HttpSessionRecorder;
use smashguard_events::delivery::webhook::WebhookDelivery;
use smashguard_events::journal::EventJournal;
use smashguard_events::sink::{BusSink, LogSink, WebhookSink};
use smashguard_events::EventBus;
use smashguard_pipeline::{InputRequest, PipelineConfig, SessionController};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Content type reported for landmark recordings.
const RECORDING_CONTENT_TYPE: &str = "video/x-landmarks+jsonl";

/// Upper bound on waiting for the backend to acknowledge a session.
const RECORD_WAIT: Duration = Duration::from_secs(30);

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "smashguard_agent=info,smashguard_pipeline=info".into());
    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let agent_config = AgentConfig::from_env();
    init_tracing(
        agent_config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or_default(),
    );
    let agent_config = agent_config.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid agent configuration");
        std::process::exit(1);
    });
    let pipeline_config = PipelineConfig::from_env().context("invalid pipeline configuration")?;

    let path = &agent_config.replay_path;
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let size_bytes = text.len() as u64;
    let recording = Arc::new(
        Recording::parse(&text).with_context(|| format!("failed to parse {}", path.display()))?,
    );

    tracing::info!(
        path = %path.display(),
        frames = recording.len(),
        width = recording.header.width,
        height = recording.header.height,
        fps = recording.header.fps,
        realtime = agent_config.realtime,
        "Starting smashguard-replay",
    );

    // -- event plumbing ------------------------------------------------------

    let bus = Arc::new(EventBus::default());
    let journal_cancel = CancellationToken::new();
    let journal = tokio::spawn(EventJournal::run(bus.subscribe(), journal_cancel.clone()));
    let mut events = bus.subscribe();

    let mut builder = SessionController::builder(
        pipeline_config.clone(),
        Arc::new(ReplayCaptureProvider::new(
            Arc::clone(&recording),
            agent_config.realtime,
        )),
        Box::new(PassthroughEngine::new(Arc::clone(&recording))),
    )
    .event_bus(Arc::clone(&bus))
    .sink(Arc::new(LogSink))
    .sink(Arc::new(BusSink::new(Arc::clone(&bus))));

    if let Some(url) = &agent_config.alert_webhook_url {
        tracing::info!(url = %url, "Forwarding alerts to webhook");
        builder = builder.sink(Arc::new(WebhookSink::new(
            Arc::new(WebhookDelivery::new()),
            url.clone(),
        )));
    }
    if let Some(url) = &agent_config.backend_url {
        let recorder = HttpSessionRecorder::new(url);
        tracing::info!(endpoint = recorder.endpoint(), "Recording sessions to backend");
        builder = builder.recorder(Arc::new(recorder));
    }
    let controller = builder.build();

    // -- run -----------------------------------------------------------------

    let request = InputRequest::video(
        path.display().to_string(),
        RECORDING_CONTENT_TYPE,
        size_bytes,
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let session_id = runner::drive(&controller, request, shutdown)
        .await
        .context("replay session failed to start")?;

    controller.with_history(ReplayReport::from_history).log();

    if agent_config.backend_url.is_some() {
        let recorded = runner::await_recording(
            &mut events,
            session_id,
            pipeline_config.min_session_samples,
            RECORD_WAIT,
        )
        .await;
        tracing::info!(%session_id, recorded, "Backend recording finished");
    }

    journal_cancel.cancel();
    if let Ok(journaled) = journal.await {
        tracing::debug!(journaled, "Event journal drained");
    }
    Ok(())
}
