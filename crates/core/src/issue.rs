use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity of a discovered issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete defect found by an analyzer, referenced by a stable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable identifier drawn from the issue registry. Codes outlive code.
    pub code: String,

    /// How bad it is.
    pub severity: Severity,

    /// Optional analyzer-specific evidence (URLs, byte counts, snippets).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
}

impl Issue {
    /// Create an issue without evidence.
    #[must_use]
    pub fn new(code: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            severity,
            evidence: None,
        }
    }

    /// Attach evidence.
    #[must_use]
    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Registry entry describing one issue code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDefinition {
    /// Stable code.
    pub code: String,
    /// Default severity for issues with this code.
    pub severity: Severity,
    /// Analyzer category that emits this code.
    pub category: String,
    /// Human-readable explanation shown to operators.
    pub human_message: String,
}

/// Persisted enumeration of known issue codes.
///
/// Codes must be stable across releases: analyzers may come and go, but a
/// code once emitted stays resolvable here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRegistry {
    definitions: BTreeMap<String, IssueDefinition>,
}

impl IssueRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous entry for the code.
    pub fn register(&mut self, definition: IssueDefinition) {
        self.definitions
            .insert(definition.code.clone(), definition);
    }

    /// Look up a definition by code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&IssueDefinition> {
        self.definitions.get(code)
    }

    /// Whether the code is known.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.definitions.contains_key(code)
    }

    /// All definitions in code order.
    pub fn iter(&self) -> impl Iterator<Item = &IssueDefinition> {
        self.definitions.values()
    }

    /// Number of registered codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
