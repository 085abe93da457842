//! Assembling orchestrator output into a named, timestamped [`Snapshot`].

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;
use crate::types::{
    Snapshot, SnapshotError, SnapshotResult, UrlOutcome, UrlResult, CONTENT_HASH_LEN,
};

/// Captures the start time of a run and turns its results into a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    name: String,
    started_at: DateTime<Utc>,
}

impl SnapshotBuilder {
    /// Start a snapshot named `name`, timestamped now.
    pub fn new(name: &str) -> SnapshotResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SnapshotError::InvalidConfig(
                "snapshot name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_string(),
            started_at: Utc::now(),
        })
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = at;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finish the snapshot. `results` must line up one-to-one with `urls`.
    pub fn build(self, urls: &[String], results: Vec<UrlResult>) -> SnapshotResult<Snapshot> {
        if urls.len() != results.len() {
            return Err(SnapshotError::MalformedSnapshot(format!(
                "{} results for {} URLs",
                results.len(),
                urls.len()
            )));
        }
        if let Some((i, _)) = urls
            .iter()
            .zip(&results)
            .enumerate()
            .find(|(_, (url, result))| **url != result.url)
        {
            return Err(SnapshotError::MalformedSnapshot(format!(
                "result {} does not match input URL '{}'",
                i + 1,
                urls[i]
            )));
        }

        Ok(Snapshot {
            id: None,
            name: self.name,
            created_at: self.started_at,
            results,
        })
    }
}

/// Run `urls` through `orchestrator` and build a snapshot named `name`.
pub async fn capture(
    orchestrator: &Orchestrator,
    name: &str,
    urls: &[String],
    cancel: &CancellationToken,
) -> SnapshotResult<Snapshot> {
    let builder = SnapshotBuilder::new(name)?;
    let results = orchestrator.run_with_cancel(urls, cancel).await?;
    let snapshot = builder.build(urls, results)?;
    tracing::info!(name = %snapshot.name, summary = %snapshot.summary(), "snapshot captured");
    Ok(snapshot)
}

/// Check the fields a comparison relies on.
pub fn validate(snapshot: &Snapshot) -> SnapshotResult<()> {
    for (i, result) in snapshot.results.iter().enumerate() {
        if result.url.trim().is_empty() {
            return Err(SnapshotError::MalformedSnapshot(format!(
                "'{}': result {} has an empty url",
                snapshot.name,
                i + 1
            )));
        }
        if let UrlOutcome::Fetched(content) = &result.outcome {
            let well_formed = content.content_hash.len() == CONTENT_HASH_LEN
                && content.content_hash.bytes().all(|b| b.is_ascii_hexdigit());
            if !well_formed {
                return Err(SnapshotError::MalformedSnapshot(format!(
                    "'{}': {} has an invalid content hash",
                    snapshot.name, result.url
                )));
            }
        }
    }
    Ok(())
}
