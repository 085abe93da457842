//! url-snapshotter entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use url_snapshotter::{SnapshotId, SnapshotStore, SqliteStore};
use url_snapshotter_cli::commands::{compare_snapshots, create_snapshot, CreateOptions};
use url_snapshotter_cli::config::{open_store, resolve_db_location, resolve_patterns, DbLocation};
use url_snapshotter_cli::repl::{self, ReplContext};
use url_snapshotter_cli::{logging, output};

#[derive(Parser)]
#[command(
    name = "url-snapshotter",
    about = "Capture the state of a list of URLs and compare captures over time",
    version,
    after_help = "Run 'url-snapshotter <command> --help' for details on each command.\nRun 'url-snapshotter' with no command to enter interactive mode."
)]
struct Cli {
    /// SQLite database file (default: ./.url-snapshotter/snapshots.db if present,
    /// else ~/.url-snapshotter/snapshots.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON file of normalization patterns (default: built-in rules).
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    /// Output results as JSON (machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Also append logs to this file (info level, debug with --debug).
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every URL in a file and save the results as a snapshot.
    Create(CreateOptions),

    /// List stored snapshots.
    List,

    /// Show one snapshot.
    View {
        /// Snapshot id.
        id: i64,

        /// Include the cleaned content of each URL.
        #[arg(long)]
        content: bool,
    },

    /// Compare two snapshots.
    Compare {
        /// Baseline snapshot id.
        baseline: i64,

        /// Current snapshot id.
        current: i64,

        /// Show a line diff for URLs whose content changed.
        #[arg(long)]
        diff: bool,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   url-snapshotter completions bash > ~/.local/share/bash-completion/completions/url-snapshotter
    ///   url-snapshotter completions zsh > ~/.zfunc/_url-snapshotter
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch the interactive menu (default).
    Repl,
}

fn open(cli: &Cli) -> anyhow::Result<(DbLocation, SqliteStore)> {
    let location = resolve_db_location(cli.db.as_deref())?;
    tracing::debug!(db = %location, "resolved database location");
    let store =
        open_store(&location).with_context(|| format!("cannot open database {location}"))?;
    Ok((location, store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.debug, cli.log_json, cli.log_file.as_deref())
        .context("cannot open log file")?;

    match cli.command.as_ref().unwrap_or(&Commands::Repl) {
        Commands::Create(options) => {
            let (_, mut store) = open(&cli)?;
            let patterns = resolve_patterns(cli.patterns.as_deref())?;
            let snapshot = create_snapshot(&mut store, patterns, options).await?;
            if cli.json {
                println!("{}", output::to_json(&snapshot)?);
            } else {
                let id = snapshot.id.map(|id| id.to_string()).unwrap_or_default();
                println!("Saved snapshot {id} '{}': {}", snapshot.name, snapshot.summary());
            }
        }

        Commands::List => {
            let (_, store) = open(&cli)?;
            let summaries = store.list_summaries()?;
            if cli.json {
                println!("{}", output::to_json(&summaries)?);
            } else {
                print!("{}", output::render_summaries(&summaries));
            }
        }

        Commands::View { id, content } => {
            let (_, store) = open(&cli)?;
            let snapshot = store.load_by_id(SnapshotId(*id))?;
            if cli.json {
                println!("{}", output::to_json(&snapshot)?);
            } else {
                print!("{}", output::render_snapshot(&snapshot, *content));
            }
        }

        Commands::Compare {
            baseline,
            current,
            diff,
        } => {
            let (_, store) = open(&cli)?;
            let report =
                compare_snapshots(&store, SnapshotId(*baseline), SnapshotId(*current), *diff)?;
            if cli.json {
                println!("{}", output::to_json(&report)?);
            } else {
                print!("{}", output::render_report(&report));
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "url-snapshotter", &mut std::io::stdout());
        }

        Commands::Repl => {
            let (location, store) = open(&cli)?;
            let patterns = resolve_patterns(cli.patterns.as_deref())?;
            let ctx = ReplContext {
                store,
                patterns,
                db_label: location.to_string(),
                json: cli.json,
            };
            let handle = tokio::runtime::Handle::current();
            tokio::task::block_in_place(move || repl::run(ctx, handle))?;
        }
    }

    Ok(())
}
