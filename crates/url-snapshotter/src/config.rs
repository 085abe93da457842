//! Run configuration consumed by the fetcher and orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{SnapshotError, SnapshotResult};

/// Default number of in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest response body read into memory (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Largest cleaned content kept on a result (2 MiB). The hash always covers
/// the full cleaned content.
pub const DEFAULT_MAX_STORED_CONTENT_BYTES: usize = 2 * 1024 * 1024;

/// Default redirect hop limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

const DEFAULT_USER_AGENT: &str = concat!("url-snapshotter/", env!("CARGO_PKG_VERSION"));

/// How HTTP error statuses are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Every response is a fetched result carrying its status code.
    #[default]
    RecordAll,
    /// 4xx and 5xx responses become failures of kind `ErrorStatus`.
    ErrorStatusIsFailure,
}

impl StatusPolicy {
    pub fn is_failure(&self, status_code: u16) -> bool {
        match self {
            Self::RecordAll => false,
            Self::ErrorStatusIsFailure => status_code >= 400,
        }
    }
}

/// Settings for one snapshot run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_body_bytes: usize,
    pub max_stored_content_bytes: usize,
    pub max_redirects: usize,
    pub status_policy: StatusPolicy,
    pub user_agent: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_stored_content_bytes: DEFAULT_MAX_STORED_CONTENT_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            status_policy: StatusPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SnapshotConfig {
    /// Reject settings that would make a run meaningless. Called before any
    /// fetch is issued.
    pub fn validate(&self) -> SnapshotResult<()> {
        if self.concurrency == 0 {
            return Err(SnapshotError::InvalidConcurrency(0));
        }
        if self.timeout.is_zero() {
            return Err(SnapshotError::InvalidTimeout);
        }
        if self.max_body_bytes == 0 {
            return Err(SnapshotError::InvalidConfig(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Convert a user-supplied concurrency value, rejecting zero and negatives
/// instead of clamping them.
pub fn parse_concurrency(value: i64) -> SnapshotResult<usize> {
    if value < 1 {
        return Err(SnapshotError::InvalidConcurrency(value));
    }
    usize::try_from(value).map_err(|_| SnapshotError::InvalidConcurrency(value))
}
