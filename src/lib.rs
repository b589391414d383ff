#![forbid(unsafe_code)]

//! Compliance scanner: evaluate declarative CEL rules against fetched resources
//!
//! A rule names the inputs it needs (cluster resources, files, services, HTTP
//! endpoints, databases) and a CEL expression over them. The
//! [`CompositeFetcher`](fetchers::CompositeFetcher) resolves inputs through
//! per-kind fetchers, the [`RuleValidator`](validation::RuleValidator)
//! type-checks the expression against exactly the names that were bound, and
//! the [`Scanner`](scanner::Scanner) turns each rule into one PASS, FAIL,
//! ERROR or NOT-APPLICABLE result.

pub mod cel;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod inputs;
pub mod output;
pub mod rules;
pub mod scanner;
pub mod types;
pub mod validation;

// Re-export error types for convenient access
pub use error::{
    CompileError, ConfigError, Error, EvalError, FetchError, InputError, RuleError, ScanError,
};

// Re-export core domain types for convenient access
pub use fetchers::{CompositeFetcher, CompositeFetcherBuilder, InputFetcher};
pub use inputs::{CelVariable, Input, InputSpec, Variable};
pub use rules::{CelRule, Rule, RuleBuilder, RuleMetadata};
pub use scanner::{CheckResult, CheckStatus, ScanConfig, ScanContext, Scanner};
pub use types::{InputKind, RuleKind};
pub use validation::{IssueKind, RuleValidator, ValidationIssue, ValidationResult};
