//! Parsing and validation for scan settings files

use crate::error::ConfigError;
use crate::inputs::{CelVariable, Variable};
use crate::rules::Rule;
use crate::scanner::ScanConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Main configuration struct for a scan settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// What to scan and how
    #[serde(default)]
    pub scan: ScanSection,

    /// Where and how results are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Caller-supplied variables
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl ScanSettings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse settings from a TOML string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let settings: ScanSettings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.parallelism == Some(0) {
            return Err(ConfigError::Validation(
                "scan.parallelism must be greater than zero".to_string(),
            ));
        }
        if self.scan.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "scan.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for variable in &self.variables {
            if !is_identifier(&variable.name) {
                return Err(ConfigError::Validation(format!(
                    "Invalid variable name '{}': must be a letter or '_' followed by letters, digits or '_'",
                    variable.name
                )));
            }
            if !names.insert(variable.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate variable '{}'",
                    variable.name
                )));
            }
        }

        Ok(())
    }

    /// Scan timeout as a `Duration`
    pub fn timeout(&self) -> Option<Duration> {
        self.scan.timeout_secs.map(Duration::from_secs)
    }

    /// Builds the scan request for `rules` from these settings
    pub fn scan_config(&self, rules: Vec<Arc<dyn Rule>>) -> ScanConfig {
        let variables = self
            .variables
            .iter()
            .cloned()
            .map(|v| Arc::new(v) as Arc<dyn CelVariable>)
            .collect();
        ScanConfig {
            rules,
            variables,
            api_resource_path: self.scan.api_resource_path.clone(),
            debug: self.scan.debug,
            parallelism: self.scan.parallelism,
            timeout: self.timeout(),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `[scan]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSection {
    /// Directory of `.toml` rule files
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,

    /// Offline mode: read cluster resources from snapshots here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_resource_path: Option<PathBuf>,

    /// Root for file inputs (defaults to the working directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_root: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub debug: bool,
}

fn default_rules_dir() -> PathBuf {
    PathBuf::from("rules")
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            rules_dir: default_rules_dir(),
            api_resource_path: None,
            files_root: None,
            parallelism: None,
            timeout_secs: None,
            debug: false,
        }
    }
}

/// `[output]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Also save results to this JSON file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub color: ColorOption,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// Pretty JSON array of results
    Json,
}

/// Color output options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorOption {
    /// Auto-detect based on terminal capabilities
    #[default]
    Auto,
    /// Always use color
    Always,
    /// Never use color
    Never,
}
