//! url-snapshotter: capture the state of a URL list and compare captures.
//!
//! A run fetches every URL with bounded concurrency, strips volatile tokens
//! from each body with an ordered pattern set, hashes the cleaned text and
//! records one result per input line. Two snapshots are compared on status
//! codes and content hashes, with an optional line diff for display.

pub mod config;
pub mod diff;
pub mod fetch;
pub mod input;
pub mod linediff;
pub mod normalize;
pub mod orchestrator;
pub mod patterns;
pub mod progress;
pub mod retry;
pub mod snapshot;
pub mod storage;
pub mod types;

pub use config::{parse_concurrency, SnapshotConfig, StatusPolicy};
pub use diff::{compare, compare_with, CompareOptions};
pub use fetch::{Fetch, FetchOutcome, HttpFetcher};
pub use input::{load_url_file, parse_url_list};
pub use linediff::{diff_lines, TextDiff};
pub use normalize::{hash_content, Normalizer};
pub use orchestrator::Orchestrator;
pub use patterns::{PatternSet, PatternSpec};
pub use progress::{ProgressEvent, ProgressEventKind, ProgressReceiver, ProgressSender};
pub use retry::{RetryPolicy, Retrying};
pub use snapshot::{capture, SnapshotBuilder};
pub use storage::{SnapshotStore, SqliteStore};
pub use types::*;
