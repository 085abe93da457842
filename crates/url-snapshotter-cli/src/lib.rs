//! url-snapshotter command-line front end.

pub mod commands;
pub mod config;
pub mod logging;
pub mod output;
pub mod repl;

pub use commands::{compare_snapshots, create_snapshot, CreateOptions};
pub use config::{open_store, resolve_db_location, resolve_patterns, DbLocation};
