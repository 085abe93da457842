//! Change detection between two snapshots.
//!
//! Equality is decided on status codes and content hashes only. The cleaned
//! text is touched solely to build an optional line diff for display.

use std::collections::{HashMap, HashSet};

use crate::linediff::{diff_lines, DEFAULT_CONTEXT_LINES};
use crate::normalize::truncate_on_char_boundary;
use crate::snapshot::validate;
use crate::types::{DiffReport, MatchedUrl, Snapshot, SnapshotResult, UrlResult};

/// Default cap on each side's cleaned content fed to the line diff.
pub const DEFAULT_MAX_DIFF_BYTES: usize = 256 * 1024;

/// Presentation options for [`compare_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Attach a line diff to every content-changed URL.
    pub line_diff: bool,
    pub context_lines: usize,
    /// Both sides are cut to this many bytes before diffing.
    pub max_diff_bytes: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            line_diff: false,
            context_lines: DEFAULT_CONTEXT_LINES,
            max_diff_bytes: DEFAULT_MAX_DIFF_BYTES,
        }
    }
}

impl CompareOptions {
    pub fn with_line_diff() -> Self {
        Self {
            line_diff: true,
            ..Self::default()
        }
    }
}

/// Compare `current` against `baseline`.
pub fn compare(baseline: &Snapshot, current: &Snapshot) -> SnapshotResult<DiffReport> {
    compare_with(baseline, current, &CompareOptions::default())
}

/// Compare with presentation options.
pub fn compare_with(
    baseline: &Snapshot,
    current: &Snapshot,
    options: &CompareOptions,
) -> SnapshotResult<DiffReport> {
    validate(baseline)?;
    validate(current)?;

    let mut duplicates = Vec::new();
    let mut seen_duplicates = HashSet::new();
    let (base_order, base_map) = index_results(baseline, &mut duplicates, &mut seen_duplicates);
    let (curr_order, curr_map) = index_results(current, &mut duplicates, &mut seen_duplicates);

    let mut matched = Vec::new();
    let mut missing_in_current = Vec::new();
    for url in &base_order {
        let before = base_map[url];
        match curr_map.get(url) {
            Some(after) => matched.push(match_url(before, after, options)),
            None => missing_in_current.push(url.to_string()),
        }
    }

    let new_in_current = curr_order
        .iter()
        .filter(|url| !base_map.contains_key(*url))
        .map(|url| url.to_string())
        .collect::<Vec<_>>();

    let report = DiffReport {
        baseline_id: baseline.id,
        current_id: current.id,
        matched,
        missing_in_current,
        new_in_current,
        duplicate_urls: duplicates,
    };

    tracing::debug!(
        matched = report.matched.len(),
        status_changed = report.status_changed().count(),
        content_changed = report.content_changed().count(),
        missing = report.missing_in_current.len(),
        new = report.new_in_current.len(),
        "compared snapshots"
    );

    Ok(report)
}

/// First-seen map from url to result, plus the urls in first-seen order.
/// Later duplicates are skipped and recorded once in `duplicates`.
fn index_results<'a>(
    snapshot: &'a Snapshot,
    duplicates: &mut Vec<String>,
    seen_duplicates: &mut HashSet<&'a str>,
) -> (Vec<&'a str>, HashMap<&'a str, &'a UrlResult>) {
    let mut order = Vec::with_capacity(snapshot.results.len());
    let mut map = HashMap::with_capacity(snapshot.results.len());

    for result in &snapshot.results {
        let url = result.url.as_str();
        if map.contains_key(url) {
            tracing::warn!(
                url,
                snapshot = %snapshot.name,
                "duplicate URL in snapshot, comparing first occurrence only"
            );
            if seen_duplicates.insert(url) {
                duplicates.push(url.to_string());
            }
            continue;
        }
        map.insert(url, result);
        order.push(url);
    }

    (order, map)
}

fn match_url(before: &UrlResult, after: &UrlResult, options: &CompareOptions) -> MatchedUrl {
    let status_changed = before.status_code() != after.status_code();
    let content_changed = before.content_hash() != after.content_hash();

    let line_diff = (options.line_diff && content_changed).then(|| {
        diff_lines(
            truncate_on_char_boundary(before.cleaned_content(), options.max_diff_bytes),
            truncate_on_char_boundary(after.cleaned_content(), options.max_diff_bytes),
            options.context_lines,
        )
    });

    MatchedUrl {
        url: before.url.clone(),
        baseline_status: before.status_code(),
        current_status: after.status_code(),
        baseline_hash: before.content_hash().map(str::to_string),
        current_hash: after.content_hash().map(str::to_string),
        status_changed,
        content_changed,
        line_diff,
    }
}
