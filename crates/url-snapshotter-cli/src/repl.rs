//! Interactive menu for url-snapshotter.
//!
//! Launch with `url-snapshotter repl` (or no subcommand at all). Type
//! `/help` for available commands, Tab for completion. Missing arguments to
//! `/create` and `/compare` are asked for interactively.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use tokio::runtime::Handle;

use url_snapshotter::{PatternSet, SnapshotId, SnapshotStore, SqliteStore};

use crate::commands::{compare_snapshots, create_snapshot, CreateOptions};
use crate::output;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/create", "Capture a snapshot: /create <url-file> <name>"),
    ("/list", "List stored snapshots"),
    ("/view", "Show a snapshot: /view <id> [--content]"),
    ("/compare", "Compare snapshots: /compare <baseline> <current> [--diff]"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct SnapshotHelper;

impl Completer for SnapshotHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        // URL list file completion
        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
        if cmd == "/create" && !args.contains(' ') {
            let mut files = Vec::new();
            if let Ok(entries) = std::fs::read_dir(".") {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|e| e == "txt") {
                        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                            files.push(name.to_string());
                        }
                    }
                }
            }
            files.sort();
            let prefix_start = input.len() - args.len();
            let matches: Vec<Pair> = files
                .iter()
                .filter(|f| f.starts_with(args.trim()))
                .map(|f| Pair {
                    display: f.clone(),
                    replacement: format!("{f} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for SnapshotHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for SnapshotHelper {}
impl Validator for SnapshotHelper {}
impl Helper for SnapshotHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

type SnapshotEditor = Editor<SnapshotHelper, DefaultHistory>;

/// Everything a REPL session works against.
pub struct ReplContext {
    pub store: SqliteStore,
    pub patterns: PatternSet,
    pub db_label: String,
    pub json: bool,
}

/// Run the interactive REPL. Must be called from a blocking section of a
/// multi-threaded tokio runtime (`tokio::task::block_in_place`).
pub fn run(mut ctx: ReplContext, handle: Handle) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[1murl-snapshotter v{}\x1b[0m \x1b[90m- database: {}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        ctx.db_label
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: SnapshotEditor = Editor::with_config(config)?;
    rl.set_helper(Some(SnapshotHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".url_snapshotter_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36msnapshot>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "create" => cmd_create(args, &mut ctx, &mut rl, &handle),
                    "list" | "ls" => cmd_list(&ctx),
                    "view" => cmd_view(args, &ctx),
                    "compare" => cmd_compare(args, &ctx, &mut rl),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

/// Ask for a value, returning `None` on an empty answer or Ctrl+C/Ctrl+D.
fn ask(rl: &mut SnapshotEditor, label: &str) -> Option<String> {
    match rl.readline(&format!("  {label}: ")) {
        Ok(answer) => Some(answer.trim().to_string()).filter(|a| !a.is_empty()),
        Err(_) => None,
    }
}

/// Parse a snapshot id argument.
pub fn parse_id(value: &str) -> Option<SnapshotId> {
    value.trim().parse::<i64>().ok().map(SnapshotId)
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands and .txt URL files.");
    eprintln!();
}

fn cmd_create(args: &str, ctx: &mut ReplContext, rl: &mut SnapshotEditor, handle: &Handle) {
    let (file_arg, name_arg) = args.split_once(' ').unwrap_or((args, ""));

    let file = match Some(file_arg.trim().to_string()).filter(|f| !f.is_empty()) {
        Some(f) => f,
        None => match ask(rl, "URL file") {
            Some(f) => f,
            None => return,
        },
    };
    let name = match Some(name_arg.trim().to_string()).filter(|n| !n.is_empty()) {
        Some(n) => n,
        None => match ask(rl, "Snapshot name") {
            Some(n) => n,
            None => return,
        },
    };

    let options = CreateOptions::new(file, name);
    let patterns = ctx.patterns.clone();
    match handle.block_on(create_snapshot(&mut ctx.store, patterns, &options)) {
        Ok(snapshot) => {
            let id = snapshot.id.map(|id| id.to_string()).unwrap_or_default();
            eprintln!("  Saved snapshot {id} '{}': {}", snapshot.name, snapshot.summary());
        }
        Err(e) => eprintln!("  Create failed: {e:#}"),
    }
}

fn cmd_list(ctx: &ReplContext) {
    match ctx.store.list_summaries() {
        Ok(summaries) if ctx.json => print_json(&summaries),
        Ok(summaries) => print!("{}", output::render_summaries(&summaries)),
        Err(e) => eprintln!("  Cannot list snapshots: {e}"),
    }
}

fn cmd_view(args: &str, ctx: &ReplContext) {
    let mut parts = args.split_whitespace();
    let Some(id) = parts.next().and_then(parse_id) else {
        eprintln!("  Usage: /view <id> [--content]");
        return;
    };
    let show_content = parts.any(|p| p == "--content");

    match ctx.store.load_by_id(id) {
        Ok(snapshot) if ctx.json => print_json(&snapshot),
        Ok(snapshot) => print!("{}", output::render_snapshot(&snapshot, show_content)),
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_compare(args: &str, ctx: &ReplContext, rl: &mut SnapshotEditor) {
    let mut ids = Vec::new();
    let mut line_diff = false;
    for part in args.split_whitespace() {
        if part == "--diff" {
            line_diff = true;
        } else if let Some(id) = parse_id(part) {
            ids.push(id);
        } else {
            eprintln!("  Not a snapshot id: '{part}'");
            return;
        }
    }

    while ids.len() < 2 {
        let label = if ids.is_empty() {
            "Baseline snapshot id"
        } else {
            "Current snapshot id"
        };
        match ask(rl, label).as_deref().and_then(parse_id) {
            Some(id) => ids.push(id),
            None => {
                eprintln!("  Usage: /compare <baseline> <current> [--diff]");
                return;
            }
        }
    }

    match compare_snapshots(&ctx.store, ids[0], ids[1], line_diff) {
        Ok(report) if ctx.json => print_json(&report),
        Ok(report) => print!("{}", output::render_report(&report)),
        Err(e) => eprintln!("  Compare failed: {e:#}"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match output::to_json(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("  Cannot encode JSON: {e}"),
    }
}
