//! Tracing subscriber setup. Logs go to stderr; stdout carries command output.
//!
//! With `--log-file` a second layer appends plain-text records to that file
//! at info level (debug with `--debug`), independent of the console filter.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Level used when `RUST_LOG` is unset.
pub fn effective_level(log_level: &str, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        log_level
    }
}

/// Level recorded in the log file.
pub fn file_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Open `path` for appending, creating parent directories as needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// A layer writing plain-text records to `path`.
pub fn file_layer(path: &Path, debug: bool) -> io::Result<BoxedLayer> {
    let file = open_log_file(path)?;
    Ok(fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(file_level(debug))
        .boxed())
}

/// Install the global subscriber. `RUST_LOG` overrides the console flags.
pub fn init(log_level: &str, debug: bool, json: bool, log_file: Option<&Path>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(effective_level(log_level, debug)));

    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed()
    };

    let mut layers = vec![console];
    if let Some(path) = log_file {
        layers.push(file_layer(path, debug)?);
    }

    tracing_subscriber::registry().with(layers).init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_wins() {
        assert_eq!(effective_level("warn", true), "debug");
        assert_eq!(effective_level("info", false), "info");
    }

    #[test]
    fn test_file_level() {
        assert_eq!(file_level(false), LevelFilter::INFO);
        assert_eq!(file_level(true), LevelFilter::DEBUG);
    }

    #[test]
    fn test_file_layer_appends_info_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/app.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "earlier run\n").unwrap();

        let subscriber = tracing_subscriber::registry().with(file_layer(&path, false).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(url = "https://a.example", "snapshot captured");
            tracing::debug!("too detailed for the file");
        });

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("earlier run\n"));
        assert!(text.contains("snapshot captured"));
        assert!(text.contains("https://a.example"));
        assert!(!text.contains("too detailed"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/app.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
