//! Snapshot persistence.
//!
//! A snapshot is one row in `snapshots` plus one row per URL result in
//! `url_results`, keyed by `(snapshot_id, position)` so input order
//! (duplicates included) survives a round trip. A save is a single
//! transaction: either the whole snapshot is stored or nothing is.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{
    FailureKind, FetchFailure, FetchedContent, Snapshot, SnapshotError, SnapshotId,
    SnapshotResult, SnapshotSummary, UrlOutcome, UrlResult,
};

/// Where snapshots live between runs.
pub trait SnapshotStore {
    /// Persist `snapshot` and return its new id.
    fn save(&mut self, snapshot: &Snapshot) -> SnapshotResult<SnapshotId>;

    /// Load a snapshot with its results in input order.
    fn load_by_id(&self, id: SnapshotId) -> SnapshotResult<Snapshot>;

    /// All stored snapshots, newest first.
    fn list_summaries(&self) -> SnapshotResult<Vec<SnapshotSummary>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS url_results (
    snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    url TEXT NOT NULL,
    status_code INTEGER,
    content_hash TEXT,
    cleaned_content TEXT,
    applied_rules TEXT,
    truncated INTEGER NOT NULL DEFAULT 0,
    failure_kind TEXT,
    failure_message TEXT,
    PRIMARY KEY (snapshot_id, position)
);
";

/// SQLite-backed [`SnapshotStore`].
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    /// Open or create a database file. Parent directories are created.
    pub fn open(path: &Path) -> SnapshotResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened snapshot database");
        Self::init(db)
    }

    /// A private database that disappears when the store is dropped.
    pub fn open_in_memory() -> SnapshotResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> SnapshotResult<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }
}

/// Raw `url_results` columns, decoded into a [`UrlResult`] outside the
/// rusqlite row closure.
struct StoredResult {
    url: String,
    status_code: Option<u16>,
    content_hash: Option<String>,
    cleaned_content: Option<String>,
    applied_rules: Option<String>,
    truncated: bool,
    failure_kind: Option<String>,
    failure_message: Option<String>,
}

impl StoredResult {
    fn into_result(self) -> SnapshotResult<UrlResult> {
        if let Some(kind) = self.failure_kind {
            let kind = FailureKind::parse(&kind).ok_or_else(|| {
                SnapshotError::MalformedSnapshot(format!(
                    "{}: unknown failure kind '{kind}'",
                    self.url
                ))
            })?;
            let failure = FetchFailure::new(kind, self.failure_message.unwrap_or_default());
            return Ok(UrlResult::failed(self.url, failure));
        }

        let (Some(status_code), Some(content_hash)) = (self.status_code, self.content_hash) else {
            return Err(SnapshotError::MalformedSnapshot(format!(
                "{}: fetched result without status or hash",
                self.url
            )));
        };
        let applied_rules = match self.applied_rules {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        Ok(UrlResult::fetched(
            self.url,
            FetchedContent {
                status_code,
                content_hash,
                cleaned_content: self.cleaned_content.unwrap_or_default(),
                applied_rules,
                truncated: self.truncated,
            },
        ))
    }
}

fn parse_timestamp(value: &str) -> SnapshotResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SnapshotError::MalformedSnapshot(format!("bad created_at '{value}': {e}")))
}

impl SnapshotStore for SqliteStore {
    fn save(&mut self, snapshot: &Snapshot) -> SnapshotResult<SnapshotId> {
        let tx = self.db.transaction()?;
        tx.execute(
            "INSERT INTO snapshots (name, created_at) VALUES (?1, ?2)",
            params![snapshot.name, snapshot.created_at.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO url_results (
                    snapshot_id, position, url, status_code, content_hash,
                    cleaned_content, applied_rules, truncated, failure_kind, failure_message
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for (position, result) in snapshot.results.iter().enumerate() {
                match &result.outcome {
                    UrlOutcome::Fetched(c) => {
                        let rules = serde_json::to_string(&c.applied_rules)?;
                        stmt.execute(params![
                            id,
                            position as i64,
                            result.url,
                            c.status_code,
                            c.content_hash,
                            c.cleaned_content,
                            rules,
                            c.truncated,
                            None::<String>,
                            None::<String>,
                        ])?;
                    }
                    UrlOutcome::Failed(f) => {
                        stmt.execute(params![
                            id,
                            position as i64,
                            result.url,
                            None::<u16>,
                            None::<String>,
                            None::<String>,
                            None::<String>,
                            false,
                            f.kind.as_str(),
                            f.message,
                        ])?;
                    }
                }
            }
        }

        tx.commit()?;
        tracing::info!(id, name = %snapshot.name, urls = snapshot.results.len(), "saved snapshot");
        Ok(SnapshotId(id))
    }

    fn load_by_id(&self, id: SnapshotId) -> SnapshotResult<Snapshot> {
        let header = self
            .db
            .query_row(
                "SELECT name, created_at FROM snapshots WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        let Some((name, created_at)) = header else {
            return Err(SnapshotError::SnapshotNotFound(id));
        };

        let mut stmt = self.db.prepare(
            "SELECT url, status_code, content_hash, cleaned_content, applied_rules,
                    truncated, failure_kind, failure_message
             FROM url_results WHERE snapshot_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![id.0], |row| {
                Ok(StoredResult {
                    url: row.get(0)?,
                    status_code: row.get(1)?,
                    content_hash: row.get(2)?,
                    cleaned_content: row.get(3)?,
                    applied_rules: row.get(4)?,
                    truncated: row.get(5)?,
                    failure_kind: row.get(6)?,
                    failure_message: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let results = rows
            .into_iter()
            .map(StoredResult::into_result)
            .collect::<SnapshotResult<Vec<_>>>()?;

        Ok(Snapshot {
            id: Some(id),
            name,
            created_at: parse_timestamp(&created_at)?,
            results,
        })
    }

    fn list_summaries(&self) -> SnapshotResult<Vec<SnapshotSummary>> {
        let mut stmt = self.db.prepare(
            "SELECT s.id, s.name, s.created_at, COUNT(r.position)
             FROM snapshots s
             LEFT JOIN url_results r ON r.snapshot_id = s.id
             GROUP BY s.id
             ORDER BY s.id DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, created_at, count)| {
                Ok(SnapshotSummary {
                    id: SnapshotId(id),
                    name,
                    created_at: parse_timestamp(&created_at)?,
                    url_count: count as usize,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::hash_content;

    fn sample(name: &str) -> Snapshot {
        Snapshot {
            id: None,
            name: name.to_string(),
            created_at: Utc::now(),
            results: vec![
                UrlResult::fetched(
                    "https://b.example",
                    FetchedContent {
                        status_code: 200,
                        content_hash: hash_content("<p>b</p>"),
                        cleaned_content: "<p>b</p>".to_string(),
                        applied_rules: vec!["csrf-meta-token".to_string()],
                        truncated: false,
                    },
                ),
                UrlResult::failed(
                    "https://down.example",
                    FetchFailure::new(FailureKind::Timeout, "no response within 5000ms"),
                ),
                UrlResult::fetched(
                    "https://b.example",
                    FetchedContent {
                        status_code: 503,
                        content_hash: hash_content(""),
                        cleaned_content: String::new(),
                        applied_rules: Vec::new(),
                        truncated: true,
                    },
                ),
            ],
        }
    }

    #[test]
    fn test_save_and_load() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let snapshot = sample("nightly");
        let id = store.save(&snapshot).unwrap();

        let loaded = store.load_by_id(id).unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.name, "nightly");
        assert_eq!(loaded.results, snapshot.results);
        // RFC 3339 keeps sub-second precision.
        assert_eq!(loaded.created_at, snapshot.created_at);
    }

    #[test]
    fn test_missing_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load_by_id(SnapshotId(42)),
            Err(SnapshotError::SnapshotNotFound(SnapshotId(42)))
        ));
    }

    #[test]
    fn test_list_summaries_newest_first() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.save(&sample("first")).unwrap();
        let second = store.save(&sample("second")).unwrap();

        let summaries = store.list_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, second);
        assert_eq!(summaries[1].id, first);
        assert_eq!(summaries[0].name, "second");
        assert_eq!(summaries[0].url_count, 3);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshots.db");

        let id = {
            let mut store = SqliteStore::open(&path).unwrap();
            store.save(&sample("kept")).unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load_by_id(id).unwrap().name, "kept");
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.list_summaries().unwrap().is_empty());
    }
}
