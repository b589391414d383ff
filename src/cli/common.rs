//! Common helper functions shared across CLI commands

use crate::cli::args::ColorChoice;
use crate::config::ScanSettings;
use crate::error::{ConfigError, RuleError};
use crate::rules::{Rule, load_rules_from_dir};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_PARSE_ERROR: i32 = 3;

/// Loads the settings file, or defaults when none was given
///
/// # Errors
///
/// Returns `ConfigError::Io` if the file cannot be read and
/// `ConfigError::Parse`/`ConfigError::Validation` if it is invalid.
pub(crate) fn load_settings(path: Option<&Path>) -> Result<ScanSettings, ConfigError> {
    match path {
        Some(path) => ScanSettings::load(path),
        None => Ok(ScanSettings::default()),
    }
}

/// Loads every rule file under `dir`
pub(crate) fn load_rules(dir: &Path) -> Result<Vec<Arc<dyn Rule>>, RuleError> {
    load_rules_from_dir(dir)
}

/// Exit code for a rule loading failure
pub(crate) fn rule_error_exit_code(error: &RuleError) -> i32 {
    match error {
        RuleError::InvalidDefinition(_)
        | RuleError::DuplicateInput { .. }
        | RuleError::DuplicateRule(_) => EXIT_PARSE_ERROR,
        RuleError::Io { .. } => EXIT_ERROR,
    }
}

/// Resolves the color choice for stdout
pub(crate) fn color_choice(choice: ColorChoice) -> termcolor::ColorChoice {
    match choice {
        ColorChoice::Always => termcolor::ColorChoice::Always,
        ColorChoice::Never => termcolor::ColorChoice::Never,
        ColorChoice::Auto if std::io::stdout().is_terminal() => termcolor::ColorChoice::Auto,
        ColorChoice::Auto => termcolor::ColorChoice::Never,
    }
}
