//! Error types for the compliance scanner
//!
//! Each concern owns its own error enum; `Error` wraps them at the top for
//! callers (such as the CLI) that deal with more than one layer at a time.

use crate::types::InputKind;
use crate::validation::ValidationIssue;
use std::path::PathBuf;

/// Errors raised when an input specification is incomplete or malformed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// A field the input kind requires was left empty
    #[error("{kind} input requires '{field}'")]
    MissingField { kind: InputKind, field: &'static str },

    /// A field is present but its value is unusable
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Errors raised while resolving inputs into bindings
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No fetcher is registered for the input's kind (pre-flight check)
    #[error("unsupported input type '{kind}' for input '{input}'")]
    UnsupportedInputType { input: String, kind: InputKind },

    /// The input's own specification failed validation
    #[error("invalid input spec for '{input}': {source}")]
    InvalidInputSpec {
        input: String,
        #[source]
        source: InputError,
    },

    /// No fetcher resolved while fetching
    #[error("no fetcher available for input type '{0}'")]
    NoFetcher(InputKind),

    /// A fetcher for one kind-partition failed; the whole fetch is abandoned
    #[error("failed to fetch inputs for type '{kind}': {source}")]
    Partition {
        kind: InputKind,
        #[source]
        source: Box<FetchError>,
    },

    /// The requested resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Reading a file or snapshot failed
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetched content could not be decoded
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The scan was cancelled or timed out before the fetch started
    #[error("fetch cancelled")]
    Cancelled,

    /// Free-form failure reported by a collaborator fetcher
    #[error("{0}")]
    Other(String),
}

/// Runtime failures while evaluating a compiled expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// An identifier or field is absent from the activation or map
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    /// Map index with a key that is not present
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// Field selection on a value that has no fields
    #[error("type '{type_name}' does not support field selection (field '{field}')")]
    UnsupportedSelection { field: String, type_name: String },

    /// No runtime overload accepts the argument types
    #[error("no such overload: {function} applied to {args}")]
    NoMatchingOverload { function: String, args: String },

    /// List index outside the list bounds
    #[error("index out of range: {index} (size {size})")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{0}'")]
    Overflow(&'static str),

    /// A builtin function rejected its input
    #[error("{function}: {message}")]
    Function { function: String, message: String },
}

/// Rule construction and loading errors
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Invalid rule definition
    #[error("Invalid rule definition: {0}")]
    InvalidDefinition(String),

    /// Two inputs of one rule share a binding name
    #[error("Duplicate input name '{input}' in rule '{rule}'")]
    DuplicateInput { rule: String, input: String },

    /// Two rules in one rule set share an identifier
    #[error("Duplicate rule ID '{0}'")]
    DuplicateRule(String),

    /// Rule file could not be read
    #[error("Failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Strict compilation failure; carries every classified issue
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("CEL compilation failed: {}", render_issues(.issues))]
pub struct CompileError {
    pub issues: Vec<ValidationIssue>,
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("[{}] {}", issue.kind, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantic validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Scan-level failures; these abort a scan before any rule is processed
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The scan was submitted without any rules
    #[error("no rules submitted for scanning")]
    NoRules,

    /// Rule identifiers must be unique within one scan
    #[error("duplicate rule identifier '{0}' in scan")]
    DuplicateRule(String),

    /// The bounded worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Result file I/O
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Result (de)serialization
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error type for the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rule error
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Compilation error
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// Scan error
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
}
