//! Optional retry wrapper around a single-attempt [`Fetch`].
//!
//! Only transport-level failures (timeouts and connection errors) are
//! retried. Any HTTP response, including 5xx, is returned as-is so the
//! snapshot records what the server actually said.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::{Fetch, FetchOutcome};
use crate::types::FailureKind;

/// How many extra attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    pub fn is_retryable(kind: FailureKind) -> bool {
        matches!(kind, FailureKind::Timeout | FailureKind::ConnectionError)
    }
}

/// A [`Fetch`] that re-issues retryable failures.
pub struct Retrying {
    inner: Arc<dyn Fetch>,
    policy: RetryPolicy,
}

impl Retrying {
    pub fn new(inner: Arc<dyn Fetch>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Fetch for Retrying {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut retries = 0u32;

        loop {
            let outcome = self.inner.fetch(url).await;
            let retryable = match &outcome {
                FetchOutcome::Failure(f) => RetryPolicy::is_retryable(f.kind),
                FetchOutcome::Success { .. } => false,
            };
            if !retryable || retries >= self.policy.max_retries {
                return outcome;
            }

            retries += 1;
            tracing::warn!(
                url,
                retry = retries,
                max_retries = self.policy.max_retries,
                "fetch failed, retrying"
            );
            tokio::time::sleep(self.policy.backoff * retries).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchFailure;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `kind` for the first `failures` calls, then succeeds.
    struct Flaky {
        kind: FailureKind,
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Fetch for Flaky {
        async fn fetch(&self, _url: &str) -> FetchOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                FetchOutcome::Failure(FetchFailure::new(self.kind, "flaky"))
            } else {
                FetchOutcome::Success {
                    status_code: 200,
                    body: b"ok".to_vec(),
                    charset: None,
                }
            }
        }
    }

    fn flaky(kind: FailureKind, failures: u32) -> Arc<Flaky> {
        Arc::new(Flaky {
            kind,
            failures,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_retries_timeouts_until_success() {
        let inner = flaky(FailureKind::Timeout, 2);
        let fetcher = Retrying::new(inner.clone(), RetryPolicy::new(3, Duration::ZERO));
        assert!(fetcher.fetch("https://a.example").await.is_success());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = flaky(FailureKind::ConnectionError, 10);
        let fetcher = Retrying::new(inner.clone(), RetryPolicy::new(2, Duration::ZERO));
        assert!(!fetcher.fetch("https://a.example").await.is_success());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_failures() {
        let inner = flaky(FailureKind::InvalidUrl, 10);
        let fetcher = Retrying::new(inner.clone(), RetryPolicy::new(5, Duration::ZERO));
        assert!(!fetcher.fetch("nope").await.is_success());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_policy_is_disabled() {
        assert!(!RetryPolicy::default().is_enabled());
        assert!(RetryPolicy::new(1, Duration::from_millis(10)).is_enabled());
    }
}
