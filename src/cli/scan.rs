//! Scan command implementation
//!
//! This module implements `compliance-scanner scan`, which:
//! - Loads the settings file (if any) and applies command-line overrides
//! - Loads rule files from the rules directory
//! - Wires the default fetchers (filesystem, cluster snapshots)
//! - Runs the scan and prints results (human or JSON)
//! - Optionally saves results to a JSON file
//! - Returns the exit code

use crate::cli::args::{ColorChoice, OutputFormat, ScanArgs};
use crate::cli::common::{
    EXIT_ERROR, EXIT_FAILED, EXIT_SUCCESS, color_choice, load_rules, load_settings,
    rule_error_exit_code,
};
use crate::config::ScanSettings;
use crate::error::{ConfigError, RuleError, ScanError};
use crate::fetchers::CompositeFetcher;
use crate::output::{HumanFormatter, JsonFormatter, Summary};
use crate::scanner::{ScanContext, Scanner, save_results};
use std::io::Write;
use termcolor::StandardStream;
use tracing::info;

/// Error type specific to the scan command
#[derive(Debug, thiserror::Error)]
pub(crate) enum ScanCommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the scan command
///
/// # Returns
///
/// Exit code:
/// - 0: every rule passed or was not applicable
/// - 1: at least one rule failed or errored
/// - 2: configuration, scan-level or I/O error
/// - 3: a rule file could not be parsed
pub fn run_scan(args: &ScanArgs, color: Option<ColorChoice>) -> i32 {
    match run_scan_inner(args, color) {
        Ok(true) => EXIT_SUCCESS,
        Ok(false) => EXIT_FAILED,
        Err(e) => {
            eprintln!("Error: {}", e);
            match &e {
                ScanCommandError::Rule(rule_error) => rule_error_exit_code(rule_error),
                _ => EXIT_ERROR,
            }
        }
    }
}

/// Settings file values with command-line flags applied on top
pub(crate) fn effective_settings(args: &ScanArgs) -> Result<ScanSettings, ConfigError> {
    let mut settings = load_settings(args.config.as_deref())?;

    if let Some(rules) = &args.rules {
        settings.scan.rules_dir = rules.clone();
    }
    if let Some(path) = &args.api_resources {
        settings.scan.api_resource_path = Some(path.clone());
    }
    if let Some(root) = &args.files_root {
        settings.scan.files_root = Some(root.clone());
    }
    if let Some(jobs) = args.jobs {
        let jobs = usize::try_from(jobs)
            .map_err(|_| ConfigError::Validation(format!("--jobs {jobs} is too large")))?;
        settings.scan.parallelism = Some(jobs);
    }
    if let Some(timeout) = args.timeout {
        settings.scan.timeout_secs = Some(timeout);
    }
    if let Some(output) = &args.output {
        settings.output.path = Some(output.clone());
    }
    if let Some(format) = args.format {
        settings.output.format = match format {
            OutputFormat::Human => crate::config::OutputFormat::Human,
            OutputFormat::Json => crate::config::OutputFormat::Json,
        };
    }
    settings.scan.debug |= args.debug;

    // Command-line variables replace same-named ones from the file
    for variable in &args.vars {
        settings.variables.retain(|v| v.name != variable.name);
        settings.variables.push(variable.clone());
    }

    Ok(settings)
}

fn run_scan_inner(args: &ScanArgs, color: Option<ColorChoice>) -> Result<bool, ScanCommandError> {
    let settings = effective_settings(args)?;

    let rules = load_rules(&settings.scan.rules_dir)?;
    if rules.is_empty() {
        eprintln!(
            "Warning: No rules found in {}. Nothing to scan.",
            settings.scan.rules_dir.display()
        );
        return Ok(true);
    }

    let fetcher = CompositeFetcher::with_defaults(None, None, settings.scan.files_root.as_deref());
    let scanner = Scanner::new(Some(fetcher));
    let config = settings.scan_config(rules);

    let format = OutputFormat::from(settings.output.format);
    if format == OutputFormat::Human {
        eprintln!("Scanning with {} rules...", config.rules.len());
    }

    let results = scanner.scan(&ScanContext::new(), &config)?;

    if let Some(path) = &settings.output.path {
        save_results(path, &results)?;
        info!(path = %path.display(), "saved results");
    }

    match format {
        OutputFormat::Human => {
            let choice = color.unwrap_or_else(|| settings.output.color.into());
            let mut stdout = StandardStream::stdout(color_choice(choice));
            HumanFormatter::new().write(&mut stdout, &results)?;
        }
        OutputFormat::Json => {
            let json = JsonFormatter::new()
                .format(&results)
                .map_err(ScanError::from)?;
            std::io::stdout().write_all(json.as_bytes())?;
        }
    }

    Ok(Summary::from_results(&results).is_clean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::Variable;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_settings_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("scan.toml");
        fs::write(
            &config_path,
            r#"
[scan]
rules_dir = "from-file"
parallelism = 2

[[variables]]
name = "env"
value = "staging"

[[variables]]
name = "team"
value = "core"
"#,
        )
        .unwrap();

        let args = ScanArgs {
            config: Some(config_path),
            rules: Some(PathBuf::from("from-flag")),
            jobs: Some(6),
            vars: vec![Variable::new("env", "prod")],
            format: Some(OutputFormat::Json),
            debug: true,
            ..ScanArgs::default()
        };
        let settings = effective_settings(&args).unwrap();

        assert_eq!(settings.scan.rules_dir, PathBuf::from("from-flag"));
        assert_eq!(settings.scan.parallelism, Some(6));
        assert_eq!(settings.output.format, crate::config::OutputFormat::Json);
        assert!(settings.scan.debug);
        assert_eq!(settings.variables.len(), 2);
        let env = settings.variables.iter().find(|v| v.name == "env").unwrap();
        assert_eq!(env.value, "prod");
    }

    #[test]
    fn test_missing_settings_file_is_config_error() {
        let args = ScanArgs {
            config: Some(PathBuf::from("/nonexistent/scan.toml")),
            ..ScanArgs::default()
        };
        assert!(matches!(effective_settings(&args), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanCommandError::Scan(ScanError::NoRules);
        assert_eq!(err.to_string(), "Scan error: no rules submitted for scanning");
    }
}
