//! Bounded-concurrency fan-out of fetch + normalize over a URL list.
//!
//! At most `concurrency` fetches are in flight at once (`buffer_unordered`
//! is the limiter). Each completion is written into the slot of its input
//! position, so output order is input order no matter which response lands
//! first. A failure on one URL is recorded on that URL's result and never
//! touches the others. A panic inside a fetcher is caught at the URL
//! boundary and recorded as a failure of kind `other`.
//!
//! Cancellation drops the in-flight futures, which aborts their requests,
//! and the run returns `SnapshotError::Cancelled` with no partial results.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::{SnapshotConfig, StatusPolicy};
use crate::fetch::{Fetch, FetchOutcome, HttpFetcher};
use crate::normalize::Normalizer;
use crate::patterns::PatternSet;
use crate::progress::{emit, ProgressEventKind, ProgressSender};
use crate::retry::{RetryPolicy, Retrying};
use crate::types::{
    FailureKind, FetchFailure, RunSummary, SnapshotError, SnapshotResult, UrlResult,
};

/// Drives a [`Fetch`] over many URLs.
pub struct Orchestrator {
    fetcher: Arc<dyn Fetch>,
    normalizer: Normalizer,
    concurrency: usize,
    status_policy: StatusPolicy,
    progress: Option<ProgressSender>,
}

impl Orchestrator {
    /// Build from parts. The config is validated here, before any fetch.
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        normalizer: Normalizer,
        config: &SnapshotConfig,
    ) -> SnapshotResult<Self> {
        config.validate()?;
        Ok(Self {
            fetcher,
            normalizer,
            concurrency: config.concurrency,
            status_policy: config.status_policy,
            progress: None,
        })
    }

    /// Build with the reqwest fetcher.
    pub fn from_config(config: &SnapshotConfig, patterns: PatternSet) -> SnapshotResult<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(config)?);
        let normalizer =
            Normalizer::new(patterns).with_max_stored_content(config.max_stored_content_bytes);
        Self::new(fetcher, normalizer, config)
    }

    /// Wrap the fetcher in a [`Retrying`] layer when the policy allows retries.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        if policy.is_enabled() {
            self.fetcher = Arc::new(Retrying::new(self.fetcher, policy));
        }
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every URL. Returns one result per input line, in input order.
    pub async fn run(&self, urls: &[String]) -> SnapshotResult<Vec<UrlResult>> {
        self.run_with_cancel(urls, &CancellationToken::new()).await
    }

    /// Like [`Orchestrator::run`], stopping early when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> SnapshotResult<Vec<UrlResult>> {
        if urls.is_empty() {
            return Err(SnapshotError::EmptyUrlList);
        }

        let total = urls.len();
        let started = Instant::now();
        let mut seq = 0u64;
        emit(
            &self.progress,
            &mut seq,
            ProgressEventKind::RunStarted {
                total,
                concurrency: self.concurrency,
            },
        );
        tracing::info!(total, concurrency = self.concurrency, "starting snapshot run");

        let mut slots: Vec<Option<UrlResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;

        let mut pending = std::pin::pin!(stream::iter(urls.iter().enumerate())
            .map(|(index, url)| async move {
                let result = AssertUnwindSafe(self.process_url(url))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| panicked(url, payload));
                (index, result)
            })
            .buffer_unordered(self.concurrency));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    emit(
                        &self.progress,
                        &mut seq,
                        ProgressEventKind::RunCancelled { completed, total },
                    );
                    tracing::warn!(completed, total, "snapshot run cancelled");
                    return Err(SnapshotError::Cancelled);
                }
                next = pending.next() => match next {
                    Some((index, result)) => {
                        emit(
                            &self.progress,
                            &mut seq,
                            ProgressEventKind::UrlCompleted {
                                index,
                                url: result.url.clone(),
                                status_code: result.status_code(),
                                fetched: result.is_fetched(),
                            },
                        );
                        slots[index] = Some(result);
                        completed += 1;
                    }
                    None => break,
                }
            }
        }

        let results = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                SnapshotError::MalformedSnapshot("run finished with unfilled result slots".into())
            })?;

        let summary = RunSummary::from_results(&results);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        emit(
            &self.progress,
            &mut seq,
            ProgressEventKind::RunCompleted {
                summary,
                elapsed_ms,
            },
        );
        tracing::info!(
            total = summary.total,
            fetched = summary.fetched,
            failed = summary.failed,
            elapsed_ms,
            "snapshot run completed"
        );

        Ok(results)
    }

    async fn process_url(&self, url: &str) -> UrlResult {
        tracing::debug!(url, "fetching");
        match self.fetcher.fetch(url).await {
            FetchOutcome::Success {
                status_code,
                body,
                charset,
            } => {
                if self.status_policy.is_failure(status_code) {
                    tracing::warn!(url, status = status_code, "error status recorded as failure");
                    return UrlResult::failed(
                        url,
                        FetchFailure::new(FailureKind::ErrorStatus, format!("HTTP {status_code}")),
                    );
                }
                let normalized = self.normalizer.process(&body, charset.as_deref());
                tracing::debug!(
                    url,
                    status = status_code,
                    rules = ?normalized.applied_rules,
                    "processed URL"
                );
                UrlResult::fetched(url, normalized.into_content(status_code))
            }
            FetchOutcome::Failure(failure) => {
                tracing::warn!(url, kind = %failure.kind, error = %failure.message, "fetch failed");
                UrlResult::failed(url, failure)
            }
        }
    }
}

fn panicked(url: &str, payload: Box<dyn Any + Send>) -> UrlResult {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(url, panic = %message, "fetch panicked");
    UrlResult::failed(
        url,
        FetchFailure::new(FailureKind::Other, format!("fetch panicked: {message}")),
    )
}
