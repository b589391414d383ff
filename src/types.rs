#![forbid(unsafe_code)]

//! Core domain types shared across the scanner
//!
//! The kind enums here are closed: adding a new input source or rule language
//! means adding a variant and handling it wherever the compiler points.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source kinds an input can request data from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Cluster API resources (live or from snapshots)
    Kubernetes,
    /// Files and directories on the local filesystem
    File,
    /// System services and processes
    System,
    /// HTTP endpoints
    Http,
    /// Database queries
    Database,
}

impl InputKind {
    /// Returns all input kinds
    pub fn all() -> [InputKind; 5] {
        [
            InputKind::Kubernetes,
            InputKind::File,
            InputKind::System,
            InputKind::Http,
            InputKind::Database,
        ]
    }

    /// Lowercase name as used in rule files and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Kubernetes => "kubernetes",
            InputKind::File => "file",
            InputKind::System => "system",
            InputKind::Http => "http",
            InputKind::Database => "database",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule languages
///
/// Only `Cel` is evaluated by the scanner; the other kinds can be carried,
/// validated (with a warning) and reported as not applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Cel,
    Rego,
    JsonPath,
    Custom,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Cel => "cel",
            RuleKind::Rego => "rego",
            RuleKind::JsonPath => "jsonpath",
            RuleKind::Custom => "custom",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_kind_lowercase_serialization() {
        for kind in InputKind::all() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: InputKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_rule_kind_display_matches_serde() {
        for kind in [RuleKind::Cel, RuleKind::Rego, RuleKind::JsonPath, RuleKind::Custom] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_input_kind_ordering_is_stable() {
        let mut kinds = vec![InputKind::Http, InputKind::File, InputKind::Kubernetes];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![InputKind::Kubernetes, InputKind::File, InputKind::Http]
        );
    }
}
