//! Outbound HTTP delivery of risk alerts and session summaries.
//!
//! Both channels POST JSON and share the same retry policy: up to three
//! retries with exponential backoff (1 s, 2 s, 4 s) and a 10 s timeout per
//! attempt.

pub mod session_record;
pub mod webhook;

use std::time::Duration;

/// Retry delays (exponential backoff: 1s, 2s, 4s).
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single delivery attempt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Endpoint returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Shared POST-with-retry
// ---------------------------------------------------------------------------

/// Build the shared HTTP client, falling back to reqwest defaults if the
/// configured builder is rejected.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// POST `payload` to `url`, retrying after each delay in `retry_delays`.
///
/// Returns `Ok(())` on the first successful attempt, or the first error
/// once every attempt has failed.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
    retry_delays: &[Duration],
) -> Result<(), DeliveryError> {
    let mut last_err: Option<DeliveryError> = None;

    for (attempt, delay) in retry_delays.iter().enumerate() {
        match try_post(client, url, payload).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    url,
                    error = %e,
                    "Delivery attempt failed, retrying"
                );
                last_err = Some(e);
                tokio::time::sleep(*delay).await;
            }
        }
    }

    // Final attempt after the last backoff.
    match try_post(client, url, payload).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(url, error = %e, "Delivery failed after all retries");
            Err(last_err.unwrap_or(e))
        }
    }
}

/// Execute a single POST request and check the response status.
async fn try_post(
    client: &reqwest::Client,
    url: &str,
    payload: &serde_json::Value,
) -> Result<(), DeliveryError> {
    let response = client.post(url).json(payload).send().await?;
    if !response.status().is_success() {
        return Err(DeliveryError::HttpStatus(response.status().as_u16()));
    }
    Ok(())
}
