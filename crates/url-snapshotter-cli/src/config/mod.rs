//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use url_snapshotter::{PatternSet, SnapshotError, SqliteStore};

/// Env var naming the database file.
pub const DB_ENV: &str = "URL_SNAPSHOTTER_DB";

/// Env var selecting a throwaway in-memory database.
pub const IN_MEMORY_ENV: &str = "URL_SNAPSHOTTER_IN_MEMORY";

/// Env var naming a pattern JSON file.
pub const PATTERNS_ENV: &str = "URL_SNAPSHOTTER_PATTERNS";

const LOCAL_DB: &str = ".url-snapshotter/snapshots.db";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a boolean (true/false, 1/0, yes/no, on/off), got '{value}'")]
    InvalidBool { var: String, value: String },

    #[error("Cannot load patterns from {path}: {source}")]
    Patterns {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Where snapshots are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    InMemory,
}

impl std::fmt::Display for DbLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::InMemory => f.write_str(":memory:"),
        }
    }
}

/// Resolve the database location from the flag, the environment and the
/// filesystem.
pub fn resolve_db_location(explicit: Option<&Path>) -> Result<DbLocation, ConfigError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_db_location_with(explicit, &|name| std::env::var(name).ok(), &cwd)
}

/// Same as [`resolve_db_location`] with the environment and working
/// directory supplied by the caller.
pub fn resolve_db_location_with(
    explicit: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
    cwd: &Path,
) -> Result<DbLocation, ConfigError> {
    if let Some(value) = env(IN_MEMORY_ENV) {
        if parse_bool(IN_MEMORY_ENV, &value)? {
            return Ok(DbLocation::InMemory);
        }
    }

    if let Some(path) = explicit {
        return Ok(DbLocation::File(path.to_path_buf()));
    }

    if let Some(path) = env(DB_ENV).filter(|p| !p.trim().is_empty()) {
        return Ok(DbLocation::File(PathBuf::from(path)));
    }

    let local = cwd.join(LOCAL_DB);
    if local.exists() {
        return Ok(DbLocation::File(local));
    }

    let home = env("HOME")
        .or_else(|| env("USERPROFILE"))
        .unwrap_or_else(|| ".".to_string());
    Ok(DbLocation::File(
        PathBuf::from(home).join(".url-snapshotter").join("snapshots.db"),
    ))
}

/// Parse the usual spellings of a boolean env var.
pub fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Load the pattern set: flag, then env var, then the built-in rules.
pub fn resolve_patterns(explicit: Option<&Path>) -> Result<PatternSet, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(PATTERNS_ENV).ok().map(PathBuf::from));

    match path {
        Some(path) => {
            let set = PatternSet::from_file(&path).map_err(|source| ConfigError::Patterns {
                path: path.clone(),
                source,
            })?;
            tracing::info!(path = %path.display(), rules = set.len(), "loaded pattern file");
            Ok(set)
        }
        None => Ok(PatternSet::builtin()?),
    }
}

/// Open the store at `location`.
pub fn open_store(location: &DbLocation) -> Result<SqliteStore, ConfigError> {
    let store = match location {
        DbLocation::File(path) => SqliteStore::open(path)?,
        DbLocation::InMemory => {
            tracing::warn!("using an in-memory database; snapshots are lost on exit");
            SqliteStore::open_in_memory()?
        }
    };
    Ok(store)
}
