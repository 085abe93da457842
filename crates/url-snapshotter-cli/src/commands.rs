//! Subcommand implementations shared by the binary and the REPL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use url_snapshotter::config::DEFAULT_CONCURRENCY;
use url_snapshotter::{
    capture, compare_with, load_url_file, parse_concurrency, progress, CompareOptions,
    DiffReport, Orchestrator, PatternSet, ProgressEventKind, ProgressReceiver, RetryPolicy,
    Snapshot, SnapshotConfig, SnapshotError, SnapshotId, SnapshotResult, SnapshotStore,
    StatusPolicy,
};

/// Options for capturing a new snapshot.
#[derive(Args, Debug, Clone)]
pub struct CreateOptions {
    /// File with one URL per line (`#` starts a comment).
    #[arg(short, long)]
    pub file: PathBuf,

    /// Name for the snapshot.
    #[arg(short, long)]
    pub name: String,

    /// Maximum number of requests in flight.
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY as i64, allow_negative_numbers = true)]
    pub concurrency: i64,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 5)]
    pub timeout_secs: u64,

    /// Retries for timeouts and connection errors.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Base delay between retries in milliseconds; retry n waits n times this.
    #[arg(long, default_value_t = 1000)]
    pub retry_backoff_ms: u64,

    /// Record 4xx/5xx responses as failures instead of fetched results.
    #[arg(long)]
    pub fail_on_error_status: bool,

    /// Cancel the whole run after this many seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Hide the progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

impl CreateOptions {
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            concurrency: DEFAULT_CONCURRENCY as i64,
            timeout_secs: 5,
            retries: 0,
            retry_backoff_ms: 1000,
            fail_on_error_status: false,
            deadline_secs: None,
            no_progress: false,
        }
    }

    pub fn snapshot_config(&self) -> SnapshotResult<SnapshotConfig> {
        let config = SnapshotConfig {
            concurrency: parse_concurrency(self.concurrency)?,
            timeout: Duration::from_secs(self.timeout_secs),
            status_policy: if self.fail_on_error_status {
                StatusPolicy::ErrorStatusIsFailure
            } else {
                StatusPolicy::RecordAll
            },
            ..SnapshotConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_backoff_ms))
    }
}

/// Capture and save a snapshot. Returns it with its new id.
pub async fn create_snapshot(
    store: &mut dyn SnapshotStore,
    patterns: PatternSet,
    options: &CreateOptions,
) -> anyhow::Result<Snapshot> {
    let config = options.snapshot_config()?;
    let urls = load_url_file(&options.file)
        .with_context(|| format!("cannot load URL list from {}", options.file.display()))?;

    let mut orchestrator =
        Orchestrator::from_config(&config, patterns)?.with_retry(options.retry_policy());

    let progress_task = if options.no_progress {
        None
    } else {
        let (tx, rx) = progress::channel();
        orchestrator = orchestrator.with_progress(tx);
        Some(tokio::spawn(drive_progress_bar(rx)))
    };

    let cancel = CancellationToken::new();
    let watchers = spawn_cancel_watchers(&cancel, options.deadline_secs.map(Duration::from_secs));

    let captured = capture(&orchestrator, &options.name, &urls, &cancel).await;

    for watcher in watchers {
        watcher.abort();
    }
    // Closing the sender ends the progress task.
    drop(orchestrator);
    if let Some(task) = progress_task {
        let _ = task.await;
    }

    let snapshot = match captured {
        Ok(snapshot) => snapshot,
        Err(SnapshotError::Cancelled) => {
            anyhow::bail!("snapshot run cancelled; nothing was saved")
        }
        Err(e) => return Err(e.into()),
    };

    let id = store.save(&snapshot).context("failed to save snapshot")?;
    Ok(snapshot.with_id(id))
}

/// Load two stored snapshots and compare them.
pub fn compare_snapshots(
    store: &dyn SnapshotStore,
    baseline: SnapshotId,
    current: SnapshotId,
    line_diff: bool,
) -> anyhow::Result<DiffReport> {
    let before = store
        .load_by_id(baseline)
        .with_context(|| format!("cannot load baseline snapshot {baseline}"))?;
    let after = store
        .load_by_id(current)
        .with_context(|| format!("cannot load current snapshot {current}"))?;

    let options = CompareOptions {
        line_diff,
        ..CompareOptions::default()
    };
    Ok(compare_with(&before, &after, &options)?)
}

/// Cancel `cancel` on Ctrl+C or when `deadline` elapses.
fn spawn_cancel_watchers(
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Vec<JoinHandle<()>> {
    let mut watchers = Vec::new();

    let token = cancel.clone();
    watchers.push(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            token.cancel();
        }
    }));

    if let Some(deadline) = deadline {
        let token = cancel.clone();
        watchers.push(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(secs = deadline.as_secs(), "run deadline reached, cancelling");
            token.cancel();
        }));
    }

    watchers
}

async fn drive_progress_bar(mut rx: ProgressReceiver) {
    let bar = ProgressBar::hidden();
    loop {
        match rx.recv().await {
            Ok(event) => match event.event {
                ProgressEventKind::RunStarted { total, .. } => {
                    bar.set_length(total as u64);
                    bar.set_style(
                        ProgressStyle::with_template(
                            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {wide_msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    bar.set_draw_target(ProgressDrawTarget::stderr());
                }
                ProgressEventKind::UrlCompleted { url, .. } => {
                    bar.inc(1);
                    bar.set_message(url);
                }
                ProgressEventKind::RunCompleted { .. } | ProgressEventKind::RunCancelled { .. } => {
                    break
                }
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    bar.finish_and_clear();
}
