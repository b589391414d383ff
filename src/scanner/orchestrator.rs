#![forbid(unsafe_code)]

//! Scan orchestration: one pass of resolve, compile and evaluate per rule
//!
//! Rules are data-independent and run on a rayon pool. Every rule ends in
//! exactly one [`CheckResult`]; failures inside a rule become ERROR results
//! and never abort the batch. Only the preconditions checked in
//! [`Scanner::scan`] fail the scan as a whole.

use super::context::ScanContext;
use super::result::CheckResult;
use crate::cel::{Activation, Value};
use crate::error::ScanError;
use crate::fetchers::{CompositeFetcher, KubernetesFetcher};
use crate::inputs::CelVariable;
use crate::rules::{CelRule, Rule};
use crate::types::RuleKind;
use crate::validation::RuleValidator;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CANCELLED_MESSAGE: &str = "scan cancelled before rule completed";

/// Everything one scan needs besides the fetcher
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    pub rules: Vec<Arc<dyn Rule>>,
    /// Caller-supplied scalars, bound as strings next to fetched data
    pub variables: Vec<Arc<dyn CelVariable>>,
    /// Read cluster resources from snapshots under this directory instead of
    /// the configured kubernetes fetcher
    pub api_resource_path: Option<PathBuf>,
    pub debug: bool,
    /// Worker count; `None` uses rayon's global pool
    pub parallelism: Option<usize>,
    pub timeout: Option<Duration>,
}

impl ScanConfig {
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Vec<Arc<dyn CelVariable>>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_api_resource_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.api_resource_path = Some(path.into());
        self
    }

    pub fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Runs rule sets against a configured [`CompositeFetcher`]
///
/// The fetcher is read-only for the lifetime of the scanner, so one scanner
/// can run several scans at once.
#[derive(Debug, Clone)]
pub struct Scanner {
    fetcher: CompositeFetcher,
    validator: RuleValidator,
}

impl Scanner {
    /// Creates a scanner; without a fetcher the built-in defaults are used
    /// (filesystem rooted at `.`, no cluster access)
    pub fn new(fetcher: Option<CompositeFetcher>) -> Self {
        Self {
            fetcher: fetcher.unwrap_or_else(|| CompositeFetcher::with_defaults(None, None, None)),
            validator: RuleValidator::new(),
        }
    }

    pub fn fetcher(&self) -> &CompositeFetcher {
        &self.fetcher
    }

    /// Checks every rule in `config` and returns one result per rule, in
    /// submission order
    ///
    /// # Arguments
    ///
    /// * `ctx` - Cancellation handle; tripping it turns unfinished rules into
    ///   ERROR results
    /// * `config` - Rules, variables and scan options
    ///
    /// # Errors
    ///
    /// Returns `ScanError::NoRules` for an empty rule set,
    /// `ScanError::DuplicateRule` when two rules share an identifier, and
    /// `ScanError::ThreadPool` when a bounded pool cannot be built. No results
    /// are produced in these cases.
    pub fn scan(&self, ctx: &ScanContext, config: &ScanConfig) -> Result<Vec<CheckResult>, ScanError> {
        if config.rules.is_empty() {
            return Err(ScanError::NoRules);
        }
        let mut seen = HashSet::with_capacity(config.rules.len());
        for rule in &config.rules {
            if !seen.insert(rule.id()) {
                return Err(ScanError::DuplicateRule(rule.id().to_string()));
            }
        }

        let fetcher = match &config.api_resource_path {
            Some(path) => {
                debug!(path = %path.display(), "reading cluster resources from snapshots");
                let mut offline = self.fetcher.clone();
                offline.set_kubernetes_fetcher(KubernetesFetcher::from_snapshots(path));
                Cow::Owned(offline)
            }
            None => Cow::Borrowed(&self.fetcher),
        };
        let ctx = match config.timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx.clone(),
        };

        info!(
            rules = config.rules.len(),
            variables = config.variables.len(),
            "starting scan"
        );

        let check = |rule: &Arc<dyn Rule>| {
            self.check_rule(&fetcher, &ctx, rule.as_ref(), &config.variables, config.debug)
        };
        let results: Vec<CheckResult> = match config.parallelism {
            Some(workers) => rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()?
                .install(|| config.rules.par_iter().map(check).collect()),
            None => config.rules.par_iter().map(check).collect(),
        };

        let failed = results.iter().filter(|r| r.status.is_failure()).count();
        info!(results = results.len(), failed, "scan finished");
        Ok(results)
    }

    /// Processes one rule; never fails, every outcome is a result
    fn check_rule(
        &self,
        fetcher: &CompositeFetcher,
        ctx: &ScanContext,
        rule: &dyn Rule,
        variables: &[Arc<dyn CelVariable>],
        verbose: bool,
    ) -> CheckResult {
        if ctx.is_cancelled() {
            return CheckResult::error(rule, CANCELLED_MESSAGE, Vec::new());
        }

        let result = match rule.kind() {
            RuleKind::Cel => match rule.as_cel() {
                Some(cel) => self.check_cel_rule(fetcher, ctx, rule, cel, variables),
                None => CheckResult::error(
                    rule,
                    format!("rule '{}' is declared as CEL but carries no CEL expression", rule.id()),
                    Vec::new(),
                ),
            },
            RuleKind::Rego | RuleKind::JsonPath | RuleKind::Custom => {
                CheckResult::not_applicable(
                    rule,
                    format!(
                        "rule kind '{}' is not evaluated by this scanner; rule '{}' skipped",
                        rule.kind(),
                        rule.id()
                    ),
                )
            }
        };

        if result.status.is_failure() {
            warn!(rule = rule.id(), status = %result.status, "{}", result.error_message);
        } else if verbose {
            info!(rule = rule.id(), status = %result.status, "rule checked");
        } else {
            debug!(rule = rule.id(), status = %result.status, "rule checked");
        }
        result
    }

    fn check_cel_rule(
        &self,
        fetcher: &CompositeFetcher,
        ctx: &ScanContext,
        rule: &dyn Rule,
        cel: &CelRule,
        variables: &[Arc<dyn CelVariable>],
    ) -> CheckResult {
        if cel.expression().trim().is_empty() {
            return CheckResult::error(
                rule,
                format!("rule '{}' has an empty expression", rule.id()),
                Vec::new(),
            );
        }

        // Resolve
        let (bindings, mut warnings) = match fetcher.fetch_resources(ctx, rule, variables) {
            Ok(fetched) => fetched,
            Err(_) if ctx.is_cancelled() => {
                return CheckResult::error(rule, CANCELLED_MESSAGE, Vec::new());
            }
            Err(e) => {
                return CheckResult::error(
                    rule,
                    format!("failed to fetch resources: {e}"),
                    vec![e.to_string()],
                );
            }
        };

        // Compile against exactly the names that were bound
        let mut names: Vec<&str> = bindings.keys().map(String::as_str).collect();
        names.extend(variables.iter().map(|v| v.name()));
        names.sort_unstable();
        names.dedup();
        let program = match self.validator.compile(cel.expression(), &names) {
            Ok(program) => program,
            Err(e) => {
                warnings.extend(e.issues.iter().map(ToString::to_string));
                return CheckResult::error(rule, e.to_string(), warnings);
            }
        };

        // Evaluate
        let mut activation: Activation = bindings.into_iter().collect();
        for variable in variables {
            activation.insert(variable.name(), variable.value());
        }
        match program.evaluate(&activation) {
            Ok(Value::Bool(true)) => CheckResult::pass(rule).with_warnings(warnings),
            Ok(Value::Bool(false)) => CheckResult::fail(
                rule,
                cel.error_message()
                    .map_or_else(|| format!("rule '{}' evaluated to false", rule.id()), str::to_string),
            )
            .with_warnings(warnings),
            Ok(other) => {
                let message = format!(
                    "expression must evaluate to bool, got {} ({})",
                    other.cel_type(),
                    other
                );
                warnings.push(message.clone());
                CheckResult::error(rule, message, warnings)
            }
            Err(e) => {
                let message = format!("evaluation failed: {e}");
                warnings.push(message.clone());
                CheckResult::error(rule, message, warnings)
            }
        }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(None)
    }
}
