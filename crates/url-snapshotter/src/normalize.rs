//! Body decoding, pattern cleaning and content hashing.

use std::borrow::Cow;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::config::DEFAULT_MAX_STORED_CONTENT_BYTES;
use crate::patterns::PatternSet;
use crate::types::FetchedContent;

/// Cleaned body plus its digest and audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBody {
    pub cleaned_content: String,
    pub content_hash: String,
    pub applied_rules: Vec<String>,
    pub truncated: bool,
}

impl NormalizedBody {
    pub fn into_content(self, status_code: u16) -> FetchedContent {
        FetchedContent {
            status_code,
            content_hash: self.content_hash,
            cleaned_content: self.cleaned_content,
            applied_rules: self.applied_rules,
            truncated: self.truncated,
        }
    }
}

/// Applies a [`PatternSet`] and hashes the result.
#[derive(Debug, Clone)]
pub struct Normalizer {
    patterns: Arc<PatternSet>,
    max_stored_content_bytes: usize,
}

impl Normalizer {
    pub fn new(patterns: PatternSet) -> Self {
        Self {
            patterns: Arc::new(patterns),
            max_stored_content_bytes: DEFAULT_MAX_STORED_CONTENT_BYTES,
        }
    }

    /// Cap on the cleaned content kept for display. The hash is computed
    /// before the cut.
    pub fn with_max_stored_content(mut self, bytes: usize) -> Self {
        self.max_stored_content_bytes = bytes;
        self
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Decode, clean, hash and cap one response body.
    pub fn process(&self, body: &[u8], charset_hint: Option<&str>) -> NormalizedBody {
        let text = decode_body(body, charset_hint);
        let normalized = self.patterns.normalize(&text);
        let content_hash = hash_content(&normalized.cleaned);

        let kept = truncate_on_char_boundary(&normalized.cleaned, self.max_stored_content_bytes);
        let truncated = kept.len() < normalized.cleaned.len();
        let cleaned_content = if truncated {
            kept.to_string()
        } else {
            normalized.cleaned
        };

        NormalizedBody {
            cleaned_content,
            content_hash,
            applied_rules: normalized.fired,
            truncated,
        }
    }
}

/// SHA-256 of `content`, lowercase hex.
pub fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Decode a body using the response charset when it is one we can decode
/// exactly, otherwise as lossy UTF-8.
pub fn decode_body<'a>(body: &'a [u8], charset_hint: Option<&str>) -> Cow<'a, str> {
    let charset = charset_hint
        .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
        .unwrap_or_default();

    match charset.as_str() {
        // Every byte maps to the code point of the same value.
        "iso-8859-1" | "latin1" | "latin-1" | "iso_8859-1" => {
            Cow::Owned(body.iter().map(|&b| b as char).collect())
        }
        "" | "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(body),
        other => {
            tracing::debug!(charset = other, "unsupported charset, decoding as UTF-8");
            String::from_utf8_lossy(body)
        }
    }
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternSpec;
    use crate::types::CONTENT_HASH_LEN;

    fn normalizer() -> Normalizer {
        Normalizer::new(PatternSet::builtin().unwrap())
    }

    #[test]
    fn test_hash_is_stable_sha256() {
        assert_eq!(
            hash_content(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_content("abc").len(), CONTENT_HASH_LEN);
        assert_eq!(hash_content("abc"), hash_content("abc"));
        assert_ne!(hash_content("abc"), hash_content("abd"));
    }

    #[test]
    fn test_volatile_tokens_do_not_change_hash() {
        let n = normalizer();
        let a = n.process(
            br#"<meta name="csrf-token" content="first"><p>same</p>"#,
            Some("utf-8"),
        );
        let b = n.process(
            br#"<meta name="csrf-token" content="second"><p>same</p>"#,
            Some("utf-8"),
        );
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.applied_rules, vec!["csrf-meta-token"]);
    }

    #[test]
    fn test_real_change_changes_hash() {
        let n = normalizer();
        let a = n.process(b"<p>v1</p>", None);
        let b = n.process(b"<p>v2</p>", None);
        assert_ne!(a.content_hash, b.content_hash);
        assert!(a.applied_rules.is_empty());
    }

    #[test]
    fn test_truncation_keeps_full_hash() {
        let n = Normalizer::new(PatternSet::empty()).with_max_stored_content(4);
        let out = n.process("abcdefgh".as_bytes(), None);
        assert_eq!(out.cleaned_content, "abcd");
        assert!(out.truncated);
        assert_eq!(out.content_hash, hash_content("abcdefgh"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_on_char_boundary("aé", 2), "a");
        assert_eq!(truncate_on_char_boundary("aé", 3), "aé");
        assert_eq!(truncate_on_char_boundary("", 0), "");
    }

    #[test]
    fn test_decode_latin1() {
        let body = [0x63, 0x61, 0x66, 0xE9]; // "café" in ISO-8859-1
        assert_eq!(decode_body(&body, Some("ISO-8859-1")), "café");
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let body = [0x61, 0xFF, 0x62];
        assert_eq!(decode_body(&body, Some("utf-8")), "a\u{FFFD}b");
    }

    #[test]
    fn test_into_content_carries_status() {
        let n = Normalizer::new(
            PatternSet::compile(vec![PatternSpec {
                id: "digits".to_string(),
                pattern: r"\d".to_string(),
                replacement: String::new(),
                description: String::new(),
            }])
            .unwrap(),
        );
        let content = n.process(b"a1b2", None).into_content(404);
        assert_eq!(content.status_code, 404);
        assert_eq!(content.cleaned_content, "ab");
        assert_eq!(content.applied_rules, vec!["digits"]);
    }
}
