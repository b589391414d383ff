#![forbid(unsafe_code)]

//! Per-rule check results and their JSON persistence

use crate::error::ScanError;
use crate::rules::{Rule, RuleMetadata};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Terminal state of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "NOT-APPLICABLE")]
    NotApplicable,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Error => "ERROR",
            CheckStatus::NotApplicable => "NOT-APPLICABLE",
        }
    }

    /// FAIL and ERROR need attention; PASS and NOT-APPLICABLE do not
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Fail | CheckStatus::Error)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one rule; exactly one per submitted rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub id: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub metadata: RuleMetadata,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub error_message: String,
}

impl CheckResult {
    /// Result shell for `rule`, with its metadata copied over
    pub(crate) fn for_rule(rule: &dyn Rule, status: CheckStatus) -> Self {
        Self {
            id: rule.id().to_string(),
            status,
            metadata: rule.metadata().cloned().unwrap_or_default(),
            warnings: Vec::new(),
            error_message: String::new(),
        }
    }

    pub(crate) fn pass(rule: &dyn Rule) -> Self {
        Self::for_rule(rule, CheckStatus::Pass)
    }

    pub(crate) fn fail(rule: &dyn Rule, message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            ..Self::for_rule(rule, CheckStatus::Fail)
        }
    }

    /// ERROR result; `warnings` must not be empty, the message is used when it is
    pub(crate) fn error(rule: &dyn Rule, message: impl Into<String>, warnings: Vec<String>) -> Self {
        let message = message.into();
        let warnings = if warnings.is_empty() {
            vec![message.clone()]
        } else {
            warnings
        };
        Self {
            warnings,
            error_message: message,
            ..Self::for_rule(rule, CheckStatus::Error)
        }
    }

    /// Attaches non-fatal warnings collected while the rule ran
    pub(crate) fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub(crate) fn not_applicable(rule: &dyn Rule, warning: String) -> Self {
        Self {
            warnings: vec![warning],
            ..Self::for_rule(rule, CheckStatus::NotApplicable)
        }
    }
}

/// Writes `results` to `path` as a pretty-printed JSON array
///
/// # Errors
///
/// Returns `ScanError::Serialization` if encoding fails and `ScanError::Io`
/// if the file cannot be written.
pub fn save_results(path: &Path, results: &[CheckResult]) -> Result<(), ScanError> {
    let mut json = serde_json::to_string_pretty(results)?;
    json.push('\n');
    fs::write(path, json).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a result file written by [`save_results`]
pub fn load_results(path: &Path) -> Result<Vec<CheckResult>, ScanError> {
    let content = fs::read_to_string(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
