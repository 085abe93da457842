//! Integration tests for the url-snapshotter command-line surface.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use chrono::{TimeZone, Utc};

use url_snapshotter::{
    compare, compare_with, hash_content, CompareOptions, FailureKind, FetchFailure,
    FetchedContent, Snapshot, SnapshotId, SnapshotStore, SnapshotSummary, SqliteStore, UrlResult,
};
use url_snapshotter_cli::commands::{compare_snapshots, create_snapshot, CreateOptions};
use url_snapshotter_cli::config::{
    parse_bool, resolve_db_location_with, ConfigError, DbLocation, DB_ENV, IN_MEMORY_ENV,
};
use url_snapshotter_cli::output::{render_report, render_snapshot, render_summaries, to_json};

// ─────────────────────── helpers ───────────────────────

fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| map.get(name).cloned()
}

fn page(url: &str, status: u16, body: &str) -> UrlResult {
    UrlResult::fetched(
        url,
        FetchedContent {
            status_code: status,
            content_hash: hash_content(body),
            cleaned_content: body.to_string(),
            applied_rules: Vec::new(),
            truncated: false,
        },
    )
}

fn snapshot(id: i64, name: &str, results: Vec<UrlResult>) -> Snapshot {
    Snapshot {
        id: Some(SnapshotId(id)),
        name: name.to_string(),
        created_at: Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap(),
        results,
    }
}

fn url_file(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join("urls.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://127.0.0.1:{}/", listener.local_addr().unwrap().port())
}

// ─────────────────────── config resolution ───────────────────────

#[test]
fn test_explicit_db_path_wins() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_of(&[(DB_ENV, "/from/env.db")]);
    let location =
        resolve_db_location_with(Some(Path::new("/from/flag.db")), &env, dir.path()).unwrap();
    assert_eq!(location, DbLocation::File("/from/flag.db".into()));
}

#[test]
fn test_env_db_path_before_local_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".url-snapshotter")).unwrap();
    std::fs::write(dir.path().join(".url-snapshotter/snapshots.db"), b"").unwrap();

    let env = env_of(&[(DB_ENV, "/from/env.db")]);
    assert_eq!(
        resolve_db_location_with(None, &env, dir.path()).unwrap(),
        DbLocation::File("/from/env.db".into())
    );

    let no_env = env_of(&[("HOME", "/home/someone")]);
    assert_eq!(
        resolve_db_location_with(None, &no_env, dir.path()).unwrap(),
        DbLocation::File(dir.path().join(".url-snapshotter/snapshots.db"))
    );
}

#[test]
fn test_home_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_of(&[("HOME", "/home/someone")]);
    assert_eq!(
        resolve_db_location_with(None, &env, dir.path()).unwrap(),
        DbLocation::File("/home/someone/.url-snapshotter/snapshots.db".into())
    );
}

#[test]
fn test_in_memory_switch() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_of(&[(IN_MEMORY_ENV, "true")]);
    assert_eq!(
        resolve_db_location_with(Some(Path::new("/x.db")), &env, dir.path()).unwrap(),
        DbLocation::InMemory
    );

    let off = env_of(&[(IN_MEMORY_ENV, "0"), ("HOME", "/h")]);
    assert!(matches!(
        resolve_db_location_with(None, &off, dir.path()).unwrap(),
        DbLocation::File(_)
    ));

    let bad = env_of(&[(IN_MEMORY_ENV, "maybe")]);
    assert!(matches!(
        resolve_db_location_with(None, &bad, dir.path()),
        Err(ConfigError::InvalidBool { .. })
    ));
}

#[test]
fn test_parse_bool_spellings() {
    for yes in ["1", "true", "TRUE", "yes", "on"] {
        assert!(parse_bool("X", yes).unwrap());
    }
    for no in ["0", "false", "No", "off", ""] {
        assert!(!parse_bool("X", no).unwrap());
    }
}

// ─────────────────────── rendering ───────────────────────

#[test]
fn test_render_summaries() {
    assert!(render_summaries(&[]).contains("No snapshots yet"));

    let table = render_summaries(&[SnapshotSummary {
        id: SnapshotId(7),
        name: "nightly".to_string(),
        created_at: Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap(),
        url_count: 12,
    }]);
    assert!(table.contains("nightly"));
    assert!(table.contains("2026-10-15 09:30:00 UTC"));
    assert!(table.lines().nth(1).unwrap().trim_start().starts_with('7'));
}

#[test]
fn test_render_snapshot() {
    let s = snapshot(
        3,
        "prod",
        vec![
            page("https://a.example", 200, "line one\nline two"),
            UrlResult::failed(
                "https://down.example",
                FetchFailure::new(FailureKind::Timeout, "no complete response within 5000ms"),
            ),
        ],
    );
    let text = render_snapshot(&s, false);
    assert!(text.starts_with("Snapshot 3: prod\n"));
    assert!(text.contains("2 URLs: 1 fetched, 1 failed"));
    assert!(text.contains("Status: 200"));
    assert!(text.contains("Failed: timeout: no complete response"));
    assert!(!text.contains("line one"));

    assert!(render_snapshot(&s, true).contains("      line one"));
}

#[test]
fn test_render_report_sections() {
    let before = snapshot(
        1,
        "before",
        vec![
            page("https://a.example", 200, "same"),
            page("https://b.example", 200, "old\ntext"),
            page("https://gone.example", 200, "x"),
        ],
    );
    let after = snapshot(
        2,
        "after",
        vec![
            page("https://a.example", 503, "same"),
            page("https://b.example", 200, "new\ntext"),
            page("https://fresh.example", 200, "y"),
        ],
    );
    let report = compare_with(&before, &after, &CompareOptions::with_line_diff()).unwrap();
    let text = render_report(&report);

    assert!(text.starts_with("Comparing snapshot 1 -> 2\n"));
    assert!(text.contains("Status: 200 -> 503"));
    assert!(text.contains("Content changed"));
    assert!(text.contains("-old"));
    assert!(text.contains("+new"));
    assert!(text.contains("  - https://gone.example"));
    assert!(text.contains("  + https://fresh.example"));
    assert!(!text.contains("No differences found."));
}

#[test]
fn test_render_clean_report() {
    let s = snapshot(1, "s", vec![page("https://a.example", 200, "x")]);
    let text = render_report(&compare(&s, &s).unwrap());
    assert!(text.contains("No differences found."));
}

#[test]
fn test_report_json_shape() {
    let before = snapshot(1, "a", vec![page("https://a.example", 200, "x")]);
    let after = snapshot(2, "b", vec![page("https://a.example", 404, "x")]);
    let json = to_json(&compare(&before, &after).unwrap()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["baseline_id"], 1);
    assert_eq!(value["matched"][0]["status_changed"], true);
    assert_eq!(value["matched"][0]["current_status"], 404);
}

// ─────────────────────── commands ───────────────────────

#[tokio::test]
async fn test_create_saves_snapshot_with_failures() {
    let dir = tempfile::tempdir().unwrap();
    let dead = dead_url();
    let file = url_file(dir.path(), &["# unreachable", dead.as_str()]);

    let mut store = SqliteStore::open(&dir.path().join("db/snapshots.db")).unwrap();
    let mut options = CreateOptions::new(&file, "offline");
    options.no_progress = true;
    options.timeout_secs = 2;

    let snapshot = create_snapshot(&mut store, url_snapshotter::PatternSet::empty(), &options)
        .await
        .unwrap();
    let id = snapshot.id.unwrap();
    assert_eq!(snapshot.summary().failed, 1);

    let stored = store.load_by_id(id).unwrap();
    assert_eq!(
        stored.results[0].raw_error().map(|f| f.kind),
        Some(FailureKind::ConnectionError)
    );

    let report = compare_snapshots(&store, id, id, true).unwrap();
    assert!(!report.has_changes());
}

#[tokio::test]
async fn test_create_rejects_bad_input_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open_in_memory().unwrap();

    let empty = url_file(dir.path(), &["# nothing here"]);
    let mut options = CreateOptions::new(&empty, "empty");
    options.no_progress = true;
    let err = create_snapshot(&mut store, url_snapshotter::PatternSet::empty(), &options)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("URL list is empty"));

    let mut options = CreateOptions::new(&empty, "bad");
    options.concurrency = 0;
    let err = create_snapshot(&mut store, url_snapshotter::PatternSet::empty(), &options)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid concurrency 0"));

    assert!(store.list_summaries().unwrap().is_empty());
}

#[test]
fn test_compare_missing_snapshot() {
    let store = SqliteStore::open_in_memory().unwrap();
    let err = compare_snapshots(&store, SnapshotId(1), SnapshotId(2), false).unwrap_err();
    assert!(format!("{err:#}").contains("Snapshot not found: 1"));
}
