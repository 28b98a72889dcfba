//! Shared HTTP plumbing: client construction, base URL handling and the
//! retry loop used by every client in this crate.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use themis_core::{AppError, HttpConfig};
use tokio::time::sleep;
use tracing::{debug, warn};

/// User agent sent with every upstream request.
pub const USER_AGENT: &str = concat!("Themis/", env!("CARGO_PKG_VERSION"), " (legal-harvest-bot)");

/// How a `429 Too Many Requests` answer is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    /// Wait (honoring `Retry-After`) and try again within the retry budget.
    Retry,
    /// Return [`AppError::RateLimitExceeded`] immediately so the caller decides.
    Surface,
}

/// Builds a `reqwest` client with the configured timeout.
pub fn build_client(config: &HttpConfig) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout)
        .build()
        .map_err(|e| AppError::ClientError(e.to_string()))
}

/// Parses a base URL and makes sure its path ends with `/`, so that
/// [`Url::join`] appends to it instead of replacing the last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(raw.trim()).map_err(|_| AppError::InvalidUrl(raw.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(AppError::InvalidUrl(raw.to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Reads a `Retry-After` header given in seconds.
pub fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a transport-level failure onto the error taxonomy.
pub fn map_transport_error(e: reqwest::Error, config: &HttpConfig) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(config.timeout.as_secs())
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {}", e))
    } else {
        AppError::ClientError(e.to_string())
    }
}

/// Sends the request produced by `build`, retrying transient failures.
///
/// - Timeouts, connection failures and `5xx` answers are retried with a
///   linear backoff (`retry_base_delay * attempt`).
/// - `429` is retried after the server's `Retry-After` (or an exponential
///   backoff) capped at `max_retry_delay`, unless `throttle` is
///   [`ThrottlePolicy::Surface`].
/// - `404` becomes [`AppError::DocumentNotFound`].
/// - Any other non-success status fails immediately.
///
/// `build` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`.
pub async fn send_with_retry<F>(
    config: &HttpConfig,
    throttle: ThrottlePolicy,
    url: &Url,
    build: F,
) -> Result<Response, AppError>
where
    F: Fn() -> RequestBuilder,
{
    let max_attempts = config.max_retries.max(1);
    let base_delay = config.retry_base_delay;
    let mut last_error = AppError::Generic("No attempts made".to_string());

    for attempt in 1..=max_attempts {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();

                if status.is_success() {
                    return Ok(resp);
                }

                if status == StatusCode::TOO_MANY_REQUESTS {
                    let hint = retry_after(&resp).map(|d| d.min(config.max_retry_delay));
                    last_error = AppError::RateLimitExceeded { retry_after: hint };
                    if throttle == ThrottlePolicy::Surface || attempt == max_attempts {
                        return Err(last_error);
                    }
                    let delay = hint.unwrap_or_else(|| {
                        (base_delay * 2_u32.pow(attempt)).min(config.max_retry_delay)
                    });
                    warn!(%url, attempt, delay_ms = delay.as_millis() as u64, "Throttled, backing off");
                    sleep(delay).await;
                    continue;
                }

                if status == StatusCode::NOT_FOUND {
                    return Err(AppError::DocumentNotFound(url.to_string()));
                }

                if status.is_server_error() {
                    last_error =
                        AppError::ClientError(format!("Server error: HTTP {}", status.as_u16()));
                    if attempt < max_attempts {
                        let delay = base_delay * attempt;
                        debug!(%url, attempt, status = status.as_u16(), "Server error, retrying");
                        sleep(delay).await;
                        continue;
                    }
                    return Err(last_error);
                }

                return Err(AppError::ClientError(format!(
                    "HTTP {} from {}",
                    status.as_u16(),
                    url
                )));
            }
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect();
                last_error = map_transport_error(e, config);

                if retryable && attempt < max_attempts {
                    let delay = base_delay * attempt;
                    debug!(%url, attempt, error = %last_error, "Transport error, retrying");
                    sleep(delay).await;
                    continue;
                }
                return Err(last_error);
            }
        }
    }

    Err(last_error)
}
