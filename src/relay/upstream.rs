//! Upstream fetching.
//!
//! Handlers talk to origins through the [`Upstream`] trait; [`HttpUpstream`]
//! is the reqwest-backed implementation used in production.

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use reqwest::{redirect, Client, Url};
use std::sync::Arc;
use std::time::Duration;

use super::body::{self, ByteStream};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::policy::AllowListPolicy;

/// Maximum redirects followed for a single upstream fetch.
const MAX_REDIRECTS: usize = 10;

/// A request ready to leave the gateway.
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Present only for POST; streamed upstream as-is
    pub body: Option<ByteStream>,
}

/// Status, headers and a lazy body from the origin.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

/// Something that can fetch an upstream resource.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send the request and return as soon as response headers are available.
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// Retry knob for body-less fetches that fail before any response exists.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Wait `backoff * attempt` between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

/// reqwest-backed [`Upstream`].
pub struct HttpUpstream {
    client: Client,
    retry: RetryPolicy,
}

impl HttpUpstream {
    /// Build a client with the configured timeouts. Redirects are only
    /// followed to hosts the allow-list accepts; anything else is handed back
    /// to the caller as the 3xx it is.
    pub fn new(config: &RelayConfig, policy: Arc<AllowListPolicy>) -> Result<Self> {
        let redirect_policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if attempt
                .url()
                .host_str()
                .is_some_and(|host| policy.is_allowed(host))
            {
                attempt.follow()
            } else {
                tracing::warn!(location = %attempt.url(), "Not following redirect outside the allow-list");
                attempt.stop()
            }
        });

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .redirect(redirect_policy)
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                backoff: config.retry_backoff(),
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let UpstreamRequest {
            method,
            url,
            headers,
            mut body,
        } = request;

        // A streamed body can only be sent once.
        let max_attempts = if body.is_some() {
            1
        } else {
            self.retry.max_attempts.max(1)
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(stream) = body.take() {
                builder = builder.body(reqwest::Body::wrap_stream(body::OutboundBody::new(stream)));
            }

            tracing::debug!(method = %method, url = %url, attempt, "Fetching upstream");

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    tracing::debug!(url = %url, status = %status, "Upstream responded");
                    return Ok(UpstreamResponse {
                        status,
                        headers,
                        body: body::from_reqwest(response),
                    });
                }
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let wait = self.retry.backoff * attempt;
                    tracing::warn!(
                        url = %url,
                        attempt,
                        error = %e,
                        "Upstream fetch failed, retrying in {:?}",
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    tracing::warn!(url = %url, attempt, error = %e, "Upstream fetch failed");
                    return Err(RelayError::upstream(describe(&e)));
                }
            }
        }
    }
}

fn is_retryable(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Flatten a reqwest error and its sources into one line.
fn describe(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
