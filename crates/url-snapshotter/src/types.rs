//! Core data types for URL snapshots and comparison reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::linediff::TextDiff;

/// Length of a hex-encoded SHA-256 content digest.
pub const CONTENT_HASH_LEN: usize = 64;

/// Identifier assigned to a snapshot by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub i64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a URL produced no usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionError,
    TooManyRedirects,
    InvalidUrl,
    /// A 4xx/5xx response recorded as a failure under
    /// [`crate::config::StatusPolicy::ErrorStatusIsFailure`].
    ErrorStatus,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::TooManyRedirects => "too_many_redirects",
            Self::InvalidUrl => "invalid_url",
            Self::ErrorStatus => "error_status",
            Self::Other => "other",
        }
    }

    /// Parse the stable name produced by [`FailureKind::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "timeout" => Some(Self::Timeout),
            "connection_error" => Some(Self::ConnectionError),
            "too_many_redirects" => Some(Self::TooManyRedirects),
            "invalid_url" => Some(Self::InvalidUrl),
            "error_status" => Some(Self::ErrorStatus),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetch that ended without a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Normalized body of a URL that returned a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedContent {
    pub status_code: u16,
    /// SHA-256 of the full cleaned content, hex encoded.
    pub content_hash: String,
    /// Cleaned content, possibly cut at the stored-content limit.
    pub cleaned_content: String,
    /// Ids of the normalization rules that changed the body, in rule order.
    pub applied_rules: Vec<String>,
    #[serde(default)]
    pub truncated: bool,
}

/// Outcome of one URL: either a response or a failure, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UrlOutcome {
    Fetched(FetchedContent),
    Failed(FetchFailure),
}

/// One input line's result inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlResult {
    pub url: String,
    pub outcome: UrlOutcome,
}

impl UrlResult {
    pub fn fetched(url: impl Into<String>, content: FetchedContent) -> Self {
        Self {
            url: url.into(),
            outcome: UrlOutcome::Fetched(content),
        }
    }

    pub fn failed(url: impl Into<String>, failure: FetchFailure) -> Self {
        Self {
            url: url.into(),
            outcome: UrlOutcome::Failed(failure),
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self.outcome, UrlOutcome::Fetched(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.outcome {
            UrlOutcome::Fetched(c) => Some(c.status_code),
            UrlOutcome::Failed(_) => None,
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        match &self.outcome {
            UrlOutcome::Fetched(c) => Some(&c.content_hash),
            UrlOutcome::Failed(_) => None,
        }
    }

    pub fn raw_error(&self) -> Option<&FetchFailure> {
        match &self.outcome {
            UrlOutcome::Fetched(_) => None,
            UrlOutcome::Failed(f) => Some(f),
        }
    }

    /// Cleaned content, or an empty string for a failed fetch.
    pub fn cleaned_content(&self) -> &str {
        match &self.outcome {
            UrlOutcome::Fetched(c) => &c.cleaned_content,
            UrlOutcome::Failed(_) => "",
        }
    }

    pub fn applied_rules(&self) -> &[String] {
        match &self.outcome {
            UrlOutcome::Fetched(c) => &c.applied_rules,
            UrlOutcome::Failed(_) => &[],
        }
    }
}

/// Success/failure counts for a set of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub fetched: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[UrlResult]) -> Self {
        let fetched = results.iter().filter(|r| r.is_fetched()).count();
        Self {
            total: results.len(),
            fetched,
            failed: results.len() - fetched,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} URLs: {} fetched, {} failed",
            self.total, self.fetched, self.failed
        )
    }
}

/// Results for a URL list captured at one moment. Write-once after capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// `None` until the snapshot has been saved.
    pub id: Option<SnapshotId>,
    pub name: String,
    /// When the capture started.
    pub created_at: DateTime<Utc>,
    /// One entry per input URL, in input order.
    pub results: Vec<UrlResult>,
}

impl Snapshot {
    pub fn url_count(&self) -> usize {
        self.results.len()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    pub fn with_id(mut self, id: SnapshotId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Listing entry returned by a snapshot store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub url_count: usize,
}

/// Comparison of one URL present in both snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedUrl {
    pub url: String,
    pub baseline_status: Option<u16>,
    pub current_status: Option<u16>,
    pub baseline_hash: Option<String>,
    pub current_hash: Option<String>,
    pub status_changed: bool,
    pub content_changed: bool,
    /// Line diff of the cleaned content, only when requested and the
    /// content changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_diff: Option<TextDiff>,
}

impl MatchedUrl {
    pub fn is_unchanged(&self) -> bool {
        !self.status_changed && !self.content_changed
    }
}

/// Result of comparing a baseline snapshot with a current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub baseline_id: Option<SnapshotId>,
    pub current_id: Option<SnapshotId>,
    /// URLs present on both sides, in baseline order.
    pub matched: Vec<MatchedUrl>,
    /// URLs only in the baseline, in baseline order.
    pub missing_in_current: Vec<String>,
    /// URLs only in the current snapshot, in current order.
    pub new_in_current: Vec<String>,
    /// URLs that appeared more than once on either side. Only the first
    /// occurrence was compared.
    #[serde(default)]
    pub duplicate_urls: Vec<String>,
}

impl DiffReport {
    pub fn status_changed(&self) -> impl Iterator<Item = &MatchedUrl> {
        self.matched.iter().filter(|m| m.status_changed)
    }

    pub fn content_changed(&self) -> impl Iterator<Item = &MatchedUrl> {
        self.matched.iter().filter(|m| m.content_changed)
    }

    pub fn unchanged(&self) -> impl Iterator<Item = &MatchedUrl> {
        self.matched.iter().filter(|m| m.is_unchanged())
    }

    /// Matched URLs with at least one flag set.
    pub fn changed(&self) -> impl Iterator<Item = &MatchedUrl> {
        self.matched.iter().filter(|m| !m.is_unchanged())
    }

    pub fn has_changes(&self) -> bool {
        self.changed().next().is_some()
            || !self.missing_in_current.is_empty()
            || !self.new_in_current.is_empty()
    }
}

/// Errors that can occur in the snapshot engine.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("Invalid pattern '{id}': {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("Duplicate pattern id: {0}")]
    DuplicatePatternId(String),

    #[error("Invalid concurrency {0}: must be a positive integer")]
    InvalidConcurrency(i64),

    #[error("Invalid timeout: must be greater than zero")]
    InvalidTimeout,

    #[error("URL list is empty")]
    EmptyUrlList,

    #[error("Invalid URL on line {line}: '{value}' ({reason})")]
    InvalidUrlLine {
        line: usize,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Snapshot run cancelled")]
    Cancelled,

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(String),
}

/// Convenience result type.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
