use anyhow::{Context, bail};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;

/// Sends a request, retrying rate-limited and unavailable responses.
/// The builder runs once per attempt because a sent request is consumed.
pub(crate) async fn send_with_retry<F>(mut build: F) -> anyhow::Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let response = build().send().await.context("send request")?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if is_retryable(status) && attempt < MAX_ATTEMPTS {
            let delay = retry_delay_from_headers(response.headers()).unwrap_or(Duration::from_secs(1));
            warn!(
                status = status.as_u16(),
                attempt,
                delay_secs = delay.as_secs(),
                "remote catalog throttled; retrying"
            );
            let _ = response.bytes().await;
            tokio::time::sleep(delay).await;
            continue;
        }
        return match response.error_for_status() {
            Ok(response) => Ok(response),
            Err(err) => Err(err).context("remote catalog status"),
        };
    }
    bail!("request failed after {MAX_ATTEMPTS} attempts");
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
    retry_after_seconds(headers)
        .or_else(|| ratelimit_reset_seconds(headers))
        .map(Duration::from_secs)
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn ratelimit_reset_seconds(headers: &HeaderMap) -> Option<u64> {
    let reset = headers
        .get("ratelimit-reset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    reset.checked_sub(now).filter(|delay| *delay > 0)
}
