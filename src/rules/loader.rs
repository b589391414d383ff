#![forbid(unsafe_code)]

//! Loading rule definitions from a directory

use super::{Rule, rule_from_toml};
use crate::error::RuleError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Load every `.toml` rule in `dir`
///
/// Subdirectories and files with other extensions are skipped. Rules are
/// returned sorted by file name so scans over the same directory are stable.
/// A missing directory is logged and yields no rules.
///
/// # Errors
///
/// Returns `RuleError` if:
/// - `dir` exists but is not a directory
/// - a rule file cannot be read or parsed
/// - two files define the same rule id
pub fn load_rules_from_dir(dir: &Path) -> Result<Vec<Arc<dyn Rule>>, RuleError> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "rule directory does not exist");
        return Ok(Vec::new());
    }

    if !dir.is_dir() {
        return Err(RuleError::InvalidDefinition(format!(
            "Path is not a directory: {}",
            dir.display()
        )));
    }

    let entries = fs::read_dir(dir).map_err(|source| RuleError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RuleError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) != Some("toml") {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(&path).map_err(|source| RuleError::Io {
            path: path.clone(),
            source,
        })?;
        let rule = rule_from_toml(&content).map_err(|e| match e {
            RuleError::InvalidDefinition(message) => {
                RuleError::InvalidDefinition(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;

        if !seen.insert(rule.id().to_string()) {
            return Err(RuleError::DuplicateRule(rule.id().to_string()));
        }
        debug!(rule = rule.id(), file = %path.display(), "loaded rule");
        rules.push(rule);
    }

    Ok(rules)
}
