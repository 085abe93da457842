//! Plain-text and JSON rendering of snapshots and reports.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use url_snapshotter::{DiffReport, MatchedUrl, Snapshot, SnapshotId, SnapshotSummary, UrlOutcome};

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn status_label(status: Option<u16>) -> String {
    status.map_or_else(|| "failed".to_string(), |s| s.to_string())
}

fn id_label(id: Option<SnapshotId>) -> String {
    id.map_or_else(|| "(unsaved)".to_string(), |id| id.to_string())
}

/// Pretty-printed JSON.
pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

/// Table of stored snapshots.
pub fn render_summaries(summaries: &[SnapshotSummary]) -> String {
    if summaries.is_empty() {
        return "No snapshots yet. Create one with `url-snapshotter create`.\n".to_string();
    }

    let name_width = summaries
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:<name_width$}  {:<23}  {:>5}",
        "ID", "NAME", "CREATED", "URLS"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:>6}  {:<name_width$}  {:<23}  {:>5}",
            s.id.to_string(),
            s.name,
            timestamp(&s.created_at),
            s.url_count
        );
    }
    out
}

/// Per-URL listing of one snapshot. With `show_content` the cleaned body of
/// each fetched URL is included.
pub fn render_snapshot(snapshot: &Snapshot, show_content: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Snapshot {}: {}", id_label(snapshot.id), snapshot.name);
    let _ = writeln!(out, "  Created: {}", timestamp(&snapshot.created_at));
    let _ = writeln!(out, "  Summary: {}", snapshot.summary());
    let _ = writeln!(out);

    for result in &snapshot.results {
        let _ = writeln!(out, "  {}", result.url);
        match &result.outcome {
            UrlOutcome::Fetched(content) => {
                let _ = writeln!(out, "    Status: {}", content.status_code);
                let _ = writeln!(out, "    Hash:   {}", content.content_hash);
                if !content.applied_rules.is_empty() {
                    let _ = writeln!(out, "    Rules:  {}", content.applied_rules.join(", "));
                }
                if show_content {
                    let _ = writeln!(out, "    Content:");
                    for line in content.cleaned_content.lines() {
                        let _ = writeln!(out, "      {line}");
                    }
                    if content.truncated {
                        let _ = writeln!(out, "      [content truncated]");
                    }
                }
            }
            UrlOutcome::Failed(failure) => {
                let _ = writeln!(out, "    Failed: {failure}");
            }
        }
    }
    out
}

fn render_matched(out: &mut String, m: &MatchedUrl) {
    let _ = writeln!(out, "  {}", m.url);
    if m.status_changed {
        let _ = writeln!(
            out,
            "    Status: {} -> {}",
            status_label(m.baseline_status),
            status_label(m.current_status)
        );
    }
    if m.content_changed {
        let _ = writeln!(out, "    Content changed");
        if let Some(diff) = &m.line_diff {
            if diff.is_empty() {
                let _ = writeln!(out, "    (no line differences within the diff limit)");
            }
            for line in diff.to_string().lines() {
                let _ = writeln!(out, "      {line}");
            }
        }
    }
}

/// Human-readable comparison report.
pub fn render_report(report: &DiffReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Comparing snapshot {} -> {}",
        id_label(report.baseline_id),
        id_label(report.current_id)
    );
    let _ = writeln!(
        out,
        "  Matched: {}  Unchanged: {}  Status changed: {}  Content changed: {}",
        report.matched.len(),
        report.unchanged().count(),
        report.status_changed().count(),
        report.content_changed().count()
    );
    let _ = writeln!(
        out,
        "  Missing in current: {}  New in current: {}",
        report.missing_in_current.len(),
        report.new_in_current.len()
    );

    if !report.has_changes() {
        let _ = writeln!(out);
        let _ = writeln!(out, "No differences found.");
    }

    let changed: Vec<&MatchedUrl> = report.changed().collect();
    if !changed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Changed:");
        for m in changed {
            render_matched(&mut out, m);
        }
    }

    if !report.missing_in_current.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Missing in current:");
        for url in &report.missing_in_current {
            let _ = writeln!(out, "  - {url}");
        }
    }

    if !report.new_in_current.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "New in current:");
        for url in &report.new_in_current {
            let _ = writeln!(out, "  + {url}");
        }
    }

    if !report.duplicate_urls.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Duplicate URLs (first occurrence compared):");
        for url in &report.duplicate_urls {
            let _ = writeln!(out, "  {url}");
        }
    }

    out
}
