//! Ordered regex rules that strip volatile tokens from response bodies.
//!
//! Rules run as a sequential pipeline: each rule sees the output of the one
//! before it, so rule order is part of the content hash. A set is compiled
//! once at startup and any bad pattern fails the whole load.
//!
//! The built-in rules ship in `default_patterns.json`, embedded at compile
//! time. Users can supply their own list in the same JSON shape.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::types::{SnapshotError, SnapshotResult};

/// Built-in rule list, embedded so there is no runtime file I/O.
const DEFAULT_PATTERNS_JSON: &str = include_str!("default_patterns.json");

/// Uncompiled rule as it appears in a pattern file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Stable identifier recorded in `applied_rules`.
    pub id: String,
    pub pattern: String,
    /// Literal replacement text; `$` is not expanded.
    #[serde(default)]
    pub replacement: String,
    /// Audit-trail text, logged when the rule fires.
    #[serde(default)]
    pub description: String,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    id: String,
    regex: Regex,
    replacement: String,
    description: String,
}

impl PatternRule {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Output of running the rule pipeline over one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub cleaned: String,
    /// Rules that changed the text, in pipeline order.
    pub fired: Vec<String>,
}

/// An ordered, immutable list of compiled rules.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    rules: Vec<PatternRule>,
}

impl PatternSet {
    /// A set with no rules; normalization is the identity.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile rules in the given order. Fails on the first invalid regex,
    /// empty id or repeated id.
    pub fn compile(specs: Vec<PatternSpec>) -> SnapshotResult<Self> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());

        for spec in specs {
            let id = spec.id.trim().to_string();
            if id.is_empty() {
                return Err(SnapshotError::InvalidConfig(format!(
                    "pattern '{}' has an empty id",
                    spec.pattern
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(SnapshotError::DuplicatePatternId(id));
            }
            let regex = Regex::new(&spec.pattern)
                .map_err(|source| SnapshotError::InvalidPattern { id: id.clone(), source })?;
            rules.push(PatternRule {
                id,
                regex,
                replacement: spec.replacement,
                description: spec.description,
            });
        }

        tracing::debug!(rules = rules.len(), "compiled pattern set");
        Ok(Self { rules })
    }

    /// The rules shipped with the crate.
    pub fn builtin() -> SnapshotResult<Self> {
        Self::from_json(DEFAULT_PATTERNS_JSON)
    }

    /// Parse and compile a JSON array of [`PatternSpec`].
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let specs: Vec<PatternSpec> = serde_json::from_str(json)?;
        Self::compile(specs)
    }

    /// Load a JSON pattern file.
    pub fn from_file(path: &Path) -> SnapshotResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule in order over `raw`.
    pub fn normalize(&self, raw: &str) -> Normalized {
        let mut text = raw.to_string();
        let mut fired = Vec::new();

        for rule in &self.rules {
            let replaced = match rule.regex.replace_all(&text, NoExpand(&rule.replacement)) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(s) => s,
            };
            // A match whose replacement equals the matched text is not a change.
            if replaced != text {
                tracing::debug!(rule = %rule.id, "{}", rule.description);
                fired.push(rule.id.clone());
                text = replaced;
            }
        }

        Normalized {
            cleaned: text,
            fired,
        }
    }
}
