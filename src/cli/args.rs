//! CLI argument parsing using clap

use crate::inputs::Variable;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for scanner commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// Pretty JSON array
    Json,
}

impl From<crate::config::OutputFormat> for OutputFormat {
    fn from(format: crate::config::OutputFormat) -> Self {
        match format {
            crate::config::OutputFormat::Human => OutputFormat::Human,
            crate::config::OutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Automatically detect if terminal supports color
    Auto,
    /// Always use color
    Always,
    /// Never use color
    Never,
}

impl From<crate::config::ColorOption> for ColorChoice {
    fn from(option: crate::config::ColorOption) -> Self {
        match option {
            crate::config::ColorOption::Auto => ColorChoice::Auto,
            crate::config::ColorOption::Always => ColorChoice::Always,
            crate::config::ColorOption::Never => ColorChoice::Never,
        }
    }
}

/// Compliance scanner CLI main entry point
#[derive(Parser, Debug)]
#[command(name = "compliance-scanner")]
#[command(about = "Evaluate CEL compliance rules against cluster, file and service resources")]
#[command(version)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Output coloring
    #[arg(long, global = true)]
    pub color: Option<ColorChoice>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every rule in a rule directory and report the results
    Scan(ScanArgs),

    /// Check a CEL expression, or every rule file in a directory, without fetching anything
    Validate(ValidateArgs),
}

/// Arguments of `scan`; flags override the settings file
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Scan settings file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Directory of rule files
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Read cluster resources from snapshots in this directory
    #[arg(long = "api-resources")]
    pub api_resources: Option<PathBuf>,

    /// Root directory for file inputs
    #[arg(long = "files-root")]
    pub files_root: Option<PathBuf>,

    /// Variable exposed to expressions, as NAME=VALUE (repeatable)
    #[arg(long = "var", value_parser = parse_variable)]
    pub vars: Vec<Variable>,

    /// Number of rules checked in parallel
    #[arg(long, short, value_parser = clap::value_parser!(u64).range(1..))]
    pub jobs: Option<u64>,

    /// Give up on unfinished rules after this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Also save results as JSON to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

/// Arguments of `validate`
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Expression to validate
    #[arg(required_unless_present = "rules", conflicts_with = "rules")]
    pub expression: Option<String>,

    /// Name the expression may reference (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// Validate every rule file in this directory instead
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Parses `NAME=VALUE`
fn parse_variable(raw: &str) -> Result<Variable, String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("variable name is empty in '{raw}'"));
    }
    Ok(Variable::new(name, value))
}
