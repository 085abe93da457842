//! URL list parsing.

use std::path::Path;

use url::Url;

use crate::types::{SnapshotError, SnapshotResult};

/// Parse one URL per line. Blank lines and `#` comments are skipped; every
/// other line must be an absolute http(s) URL. Duplicates are kept.
pub fn parse_url_list(text: &str) -> SnapshotResult<Vec<String>> {
    let mut urls = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let invalid = |reason: String| SnapshotError::InvalidUrlLine {
            line: index + 1,
            value: line.to_string(),
            reason,
        };
        let parsed = Url::parse(line).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        urls.push(line.to_string());
    }

    if urls.is_empty() {
        return Err(SnapshotError::EmptyUrlList);
    }
    Ok(urls)
}

/// Read and parse a URL list file.
pub fn load_url_file(path: &Path) -> SnapshotResult<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let urls = parse_url_list(&text)?;
    tracing::debug!(path = %path.display(), count = urls.len(), "loaded URL list");
    Ok(urls)
}
