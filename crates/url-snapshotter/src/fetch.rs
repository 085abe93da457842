//! Single-attempt HTTP GET wrapping reqwest.
//!
//! One request per call, no retries. Any response, whatever its status, is a
//! `Success`; only transport problems, timeouts and oversized bodies are
//! failures. The whole exchange (connect, headers and body) shares one
//! deadline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use url::Url;

use crate::config::SnapshotConfig;
use crate::types::{FailureKind, FetchFailure, SnapshotError, SnapshotResult};

/// Result of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        status_code: u16,
        body: Vec<u8>,
        /// `charset` parameter of the Content-Type header, if any.
        charset: Option<String>,
    },
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(FetchFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Anything that can fetch one URL. The orchestrator only talks to this.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &SnapshotConfig) -> SnapshotResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SnapshotError::Http(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url`, giving up after `timeout`.
    pub async fn fetch_with_timeout(&self, url: &str, timeout: Duration) -> FetchOutcome {
        let parsed = match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(u) => {
                return FetchOutcome::failure(
                    FailureKind::InvalidUrl,
                    format!("unsupported scheme '{}'", u.scheme()),
                )
            }
            Err(e) => return FetchOutcome::failure(FailureKind::InvalidUrl, e.to_string()),
        };

        match tokio::time::timeout(timeout, self.get(parsed)).await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::failure(
                FailureKind::Timeout,
                format!("no complete response within {}ms", timeout.as_millis()),
            ),
        }
    }

    async fn get(&self, url: Url) -> FetchOutcome {
        let mut response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::Failure(classify_error(&e)),
        };

        let status_code = response.status().as_u16();
        let charset = charset_from_headers(response.headers());

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return FetchOutcome::failure(
                    FailureKind::Other,
                    format!(
                        "response body of {len} bytes exceeds limit of {} bytes",
                        self.max_body_bytes
                    ),
                );
            }
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > self.max_body_bytes {
                        return FetchOutcome::failure(
                            FailureKind::Other,
                            format!(
                                "response body exceeds limit of {} bytes",
                                self.max_body_bytes
                            ),
                        );
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => return FetchOutcome::Failure(classify_error(&e)),
            }
        }

        FetchOutcome::Success {
            status_code,
            body,
            charset,
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.fetch_with_timeout(url, self.timeout).await
    }
}

/// Map a reqwest error onto a failure kind.
fn classify_error(e: &reqwest::Error) -> FetchFailure {
    let kind = if e.is_timeout() {
        FailureKind::Timeout
    } else if e.is_redirect() {
        FailureKind::TooManyRedirects
    } else if e.is_connect() {
        FailureKind::ConnectionError
    } else if e.is_builder() {
        FailureKind::InvalidUrl
    } else {
        FailureKind::Other
    };
    FetchFailure::new(kind, error_chain(e))
}

/// `e` and its sources joined with ": ".
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

fn charset_from_headers(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
