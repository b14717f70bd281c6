use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::FeedSource;

/// Errors that can occur while fetching the raw feed payload.
///
/// All of these are transient from the watcher's point of view: the tick is
/// abandoned and the next tick tries again.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body was not valid UTF-8
    #[error("Response body is not valid UTF-8")]
    InvalidUtf8,
}

/// Transport limits for a single fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    /// Deadline for one attempt, covering the response headers and the whole body
    pub timeout: Duration,
    /// Maximum accepted body size in bytes
    pub max_bytes: usize,
    /// Retries for 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub backoff_base: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 10 * 1024 * 1024, // 10MB
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl FetchLimits {
    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(retry)) // 1s, 2s, 4s
    }
}

/// Fetches the feed over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
    limits: FetchLimits,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>, limits: FetchLimits) -> Self {
        Self {
            client,
            url: url.into(),
            limits,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    /// Fetches the feed body as text.
    ///
    /// # Behavior
    ///
    /// - Rate limiting (HTTP 429) and 5xx responses trigger exponential backoff
    /// - Other non-2xx statuses fail immediately
    /// - Bodies larger than the configured limit are rejected
    /// - Bodies shorter than their Content-Length are retried
    /// - Each attempt, body included, must finish within the configured timeout
    async fn fetch(&self) -> Result<String, FetchError> {
        let mut retry_count = 0;

        let bytes = loop {
            let deadline = tokio::time::Instant::now() + self.limits.timeout;
            let response = tokio::time::timeout_at(deadline, self.client.get(&self.url).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.limits.max_retries {
                    return Err(FetchError::RateLimited(self.limits.max_retries));
                }

                let delay = self.limits.backoff(retry_count);
                tracing::warn!(
                    feed = %self.url,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if response.status().is_server_error() {
                if retry_count >= self.limits.max_retries {
                    return Err(FetchError::HttpStatus(response.status().as_u16()));
                }

                let delay = self.limits.backoff(retry_count);
                tracing::warn!(
                    feed = %self.url,
                    status = %response.status(),
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx errors fail immediately
            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            let body = tokio::time::timeout_at(
                deadline,
                read_limited_bytes(response, self.limits.max_bytes),
            )
            .await
            .map_err(|_| FetchError::Timeout)?;

            match body {
                Ok(bytes) => break bytes,
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.limits.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }

                    let delay = self.limits.backoff(retry_count);
                    tracing::debug!(
                        feed = %self.url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying incomplete download"
                    );

                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
