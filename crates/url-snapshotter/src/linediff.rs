//! Line-level text diff for displaying content changes.
//!
//! The common prefix and suffix are stripped first, so typical page edits
//! leave a small middle. That middle is aligned with an LCS table when it
//! fits in [`MAX_LCS_CELLS`]; larger middles are reported as one removed
//! block followed by one added block.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Context lines around each change when none are specified.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Upper bound on `old_lines * new_lines` for the LCS table.
pub const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTag {
    Equal,
    Delete,
    Insert,
}

impl DiffTag {
    fn prefix(&self) -> char {
        match self {
            Self::Equal => ' ',
            Self::Delete => '-',
            Self::Insert => '+',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub tag: DiffTag,
    pub text: String,
}

/// A run of changes with surrounding context. Line numbers are 1-based; a
/// zero-length side points at the line before the change, as in unified
/// diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<DiffLine>,
}

impl fmt::Display for DiffHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{} +{} @@",
            unified_range(self.old_start, self.old_len),
            unified_range(self.new_start, self.new_len)
        )?;
        for line in &self.lines {
            writeln!(f, "{}{}", line.tag.prefix(), line.text)?;
        }
        Ok(())
    }
}

/// Hunks of a line diff. Empty when the texts have the same lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    pub hunks: Vec<DiffHunk>,
}

impl TextDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn added(&self) -> usize {
        self.count(DiffTag::Insert)
    }

    pub fn removed(&self) -> usize {
        self.count(DiffTag::Delete)
    }

    fn count(&self, tag: DiffTag) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .filter(|l| l.tag == tag)
            .count()
    }
}

impl fmt::Display for TextDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in &self.hunks {
            write!(f, "{hunk}")?;
        }
        Ok(())
    }
}

fn unified_range(start: usize, len: usize) -> String {
    if len == 1 {
        start.to_string()
    } else {
        format!("{start},{len}")
    }
}

/// Diff `old` against `new` line by line, keeping `context` unchanged lines
/// around each change.
pub fn diff_lines(old: &str, new: &str, context: usize) -> TextDiff {
    diff_lines_capped(old, new, context, MAX_LCS_CELLS)
}

fn diff_lines_capped(old: &str, new: &str, context: usize, max_cells: usize) -> TextDiff {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let script = edit_script(&a, &b, max_cells);
    TextDiff {
        hunks: group_hunks(&script, context),
    }
}

fn edit_script<'a>(a: &[&'a str], b: &[&'a str], max_cells: usize) -> Vec<(DiffTag, &'a str)> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let old_mid = &a[prefix..a.len() - suffix];
    let new_mid = &b[prefix..b.len() - suffix];

    let mut script = Vec::with_capacity(a.len() + b.len());
    script.extend(a[..prefix].iter().map(|l| (DiffTag::Equal, *l)));

    let cells = old_mid.len().saturating_mul(new_mid.len());
    if cells <= max_cells {
        lcs_script(old_mid, new_mid, &mut script);
    } else {
        tracing::debug!(
            old_lines = old_mid.len(),
            new_lines = new_mid.len(),
            "diff region too large for alignment, reporting block replacement"
        );
        script.extend(old_mid.iter().map(|l| (DiffTag::Delete, *l)));
        script.extend(new_mid.iter().map(|l| (DiffTag::Insert, *l)));
    }

    script.extend(a[a.len() - suffix..].iter().map(|l| (DiffTag::Equal, *l)));
    script
}

fn lcs_script<'a>(a: &[&'a str], b: &[&'a str], out: &mut Vec<(DiffTag, &'a str)>) {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            out.push((DiffTag::Equal, a[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            out.push((DiffTag::Delete, a[i]));
            i += 1;
        } else {
            out.push((DiffTag::Insert, b[j]));
            j += 1;
        }
    }
    out.extend(a[i..].iter().map(|l| (DiffTag::Delete, *l)));
    out.extend(b[j..].iter().map(|l| (DiffTag::Insert, *l)));
}

fn group_hunks(script: &[(DiffTag, &str)], context: usize) -> Vec<DiffHunk> {
    let changes: Vec<usize> = script
        .iter()
        .enumerate()
        .filter(|(_, (tag, _))| *tag != DiffTag::Equal)
        .map(|(i, _)| i)
        .collect();

    // Merge changes whose context windows touch into one script range.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &c in &changes {
        let start = c.saturating_sub(context);
        let end = (c + 1 + context).min(script.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    ranges
        .into_iter()
        .map(|(start, end)| {
            let old_before = count_side(&script[..start], DiffTag::Insert);
            let new_before = count_side(&script[..start], DiffTag::Delete);
            let body = &script[start..end];
            let old_len = count_side(body, DiffTag::Insert);
            let new_len = count_side(body, DiffTag::Delete);
            DiffHunk {
                old_start: if old_len == 0 { old_before } else { old_before + 1 },
                old_len,
                new_start: if new_len == 0 { new_before } else { new_before + 1 },
                new_len,
                lines: body
                    .iter()
                    .map(|(tag, text)| DiffLine {
                        tag: *tag,
                        text: (*text).to_string(),
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Lines in `script` that belong to one side, i.e. everything except
/// `other_side` entries.
fn count_side(script: &[(DiffTag, &str)], other_side: DiffTag) -> usize {
    script.iter().filter(|(tag, _)| *tag != other_side).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_have_no_hunks() {
        let diff = diff_lines("a\nb\nc", "a\nb\nc", DEFAULT_CONTEXT_LINES);
        assert!(diff.is_empty());
        assert_eq!(diff.to_string(), "");
    }

    #[test]
    fn test_single_line_change_with_context() {
        let old = "a\nb\nc\nd\ne\nf\ng\nh";
        let new = "a\nb\nc\nd\nE\nf\ng\nh";
        let diff = diff_lines(old, new, 3);
        assert_eq!(diff.hunks.len(), 1);

        let hunk = &diff.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_len), (2, 7));
        assert_eq!((hunk.new_start, hunk.new_len), (2, 7));
        assert_eq!(diff.removed(), 1);
        assert_eq!(diff.added(), 1);
        assert!(diff.to_string().starts_with("@@ -2,7 +2,7 @@\n b\n c\n d\n-e\n+E\n f\n"));
    }

    #[test]
    fn test_unified_output() {
        let diff = diff_lines("x\ny", "x\nz", 3);
        assert_eq!(diff.to_string(), "@@ -1,2 +1,2 @@\n x\n-y\n+z\n");
    }

    #[test]
    fn test_insert_into_empty() {
        let diff = diff_lines("", "a", 3);
        assert_eq!(diff.to_string(), "@@ -0,0 +1 @@\n+a\n");
    }

    #[test]
    fn test_distant_changes_split_into_hunks() {
        let old: Vec<String> = (1..=20).map(|i| format!("l{i}")).collect();
        let mut new = old.clone();
        new[1] = "L2".to_string();
        new[17] = "L18".to_string();
        let diff = diff_lines(&old.join("\n"), &new.join("\n"), 3);
        assert_eq!(diff.hunks.len(), 2);
        assert_eq!(diff.removed(), 2);
        assert_eq!(diff.added(), 2);
    }

    #[test]
    fn test_nearby_changes_share_a_hunk() {
        let diff = diff_lines("a\nb\nc\nd\ne", "A\nb\nc\nd\nE", 3);
        assert_eq!(diff.hunks.len(), 1);
    }

    #[test]
    fn test_alignment_keeps_common_lines() {
        let diff = diff_lines("a\nb\nc\nd", "a\nc\nd\ne", 0);
        assert_eq!(diff.removed(), 1);
        assert_eq!(diff.added(), 1);
        let changed: Vec<&str> = diff
            .hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(changed, vec!["b", "e"]);
    }

    #[test]
    fn test_large_region_falls_back_to_block_replacement() {
        let diff = diff_lines_capped("a\nb\nc", "x\nb\nz", 3, 1);
        assert_eq!(diff.removed(), 3);
        assert_eq!(diff.added(), 3);
        let tags: Vec<DiffTag> = diff.hunks[0].lines.iter().map(|l| l.tag).collect();
        assert_eq!(
            tags,
            vec![
                DiffTag::Delete,
                DiffTag::Delete,
                DiffTag::Delete,
                DiffTag::Insert,
                DiffTag::Insert,
                DiffTag::Insert
            ]
        );
    }
}
