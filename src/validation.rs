#![forbid(unsafe_code)]

//! Expression validation and compilation
//!
//! `RuleValidator` turns compiler diagnostics into classified
//! [`ValidationIssue`]s. Each diagnostic is rendered in the
//! `ERROR: <input>:LINE:COL: message` form and categorized by the markers it
//! contains, so the same classification applies to any message source.

use crate::cel::{Diagnostic, Environment, Program};
use crate::error::CompileError;
use crate::inputs::Input;
use crate::rules::Rule;
use crate::types::RuleKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Cause category of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    SyntaxError,
    UndeclaredReference,
    TypeError,
    GeneralError,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::SyntaxError => "SYNTAX_ERROR",
            IssueKind::UndeclaredReference => "UNDECLARED_REFERENCE",
            IssueKind::TypeError => "TYPE_ERROR",
            IssueKind::GeneralError => "GENERAL_ERROR",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based position of an issue in the expression source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub line: u32,
    pub column: u32,
}

/// A classified compilation problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    /// The raw diagnostic text the issue was classified from
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<IssueLocation>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "[{}] {} (line {}, column {})",
                self.kind, self.message, loc.line, loc.column
            ),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Outcome of validating a whole rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
}

const UNDECLARED_MARKER: &str = "undeclared reference";
const SYNTAX_MARKER: &str = "syntax error";
const TYPE_MARKERS: &[&str] = &[
    "type checking",
    "no matching overload",
    "expected type",
    "does not support field selection",
    "cannot be the range",
];

/// Validates and compiles CEL expressions
///
/// Stateless; one validator can be shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl RuleValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates an expression that references no variables
    pub fn validate_expression(&self, expression: &str) -> Vec<ValidationIssue> {
        self.validate_expression_with_names(expression, &[] as &[&str])
    }

    /// Validates an expression against a set of declared variable names
    ///
    /// The result is deterministic: the same inputs always give the same
    /// issues in the same order.
    pub fn validate_expression_with_names<S: AsRef<str>>(
        &self,
        expression: &str,
        names: &[S],
    ) -> Vec<ValidationIssue> {
        match environment(names).compile(expression) {
            Ok(_) => Vec::new(),
            Err(diagnostics) => {
                debug!(
                    count = diagnostics.len(),
                    "expression failed to compile"
                );
                classify(&diagnostics)
            }
        }
    }

    /// Validates a rule against the names its inputs declare
    ///
    /// Rules of other languages are not rejected; they come back valid with a
    /// warning that they cannot be checked.
    pub fn validate_rule(&self, rule: &dyn Rule) -> ValidationResult {
        let cel = match (rule.kind(), rule.as_cel()) {
            (RuleKind::Cel, Some(cel)) => cel,
            (kind, _) => {
                return ValidationResult {
                    valid: true,
                    issues: Vec::new(),
                    warnings: vec![format!(
                        "rule '{}' has kind '{}' which cannot be validated; only CEL rules are checked",
                        rule.id(),
                        kind
                    )],
                };
            }
        };

        let names: Vec<&str> = rule.inputs().iter().map(Input::name).collect();
        let issues = self.validate_expression_with_names(cel.expression(), &names);
        debug!(rule = rule.id(), issues = issues.len(), "validated rule");
        ValidationResult {
            valid: issues.is_empty(),
            issues,
            warnings: Vec::new(),
        }
    }

    /// Strict gate: compiles or reports every classified issue
    pub fn compile<S: AsRef<str>>(
        &self,
        expression: &str,
        names: &[S],
    ) -> Result<Program, CompileError> {
        environment(names)
            .compile(expression)
            .map_err(|diagnostics| CompileError {
                issues: classify(&diagnostics),
            })
    }

    /// Classifies one raw compiler message
    pub fn categorize_compilation_error(&self, raw: &str) -> ValidationIssue {
        let lowered = raw.to_lowercase();
        let detail = strip_location(raw);

        let (kind, message) = if lowered.contains(UNDECLARED_MARKER) {
            let message = match quoted_after(raw, "undeclared reference to ") {
                Some(name) => format!("Undeclared reference to '{name}'"),
                None => format!("Undeclared reference: {detail}"),
            };
            (IssueKind::UndeclaredReference, message)
        } else if lowered.contains(SYNTAX_MARKER) {
            let detail = strip_prefix_ignore_case(detail, "syntax error:");
            (IssueKind::SyntaxError, format!("Syntax error: {detail}"))
        } else if TYPE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            (IssueKind::TypeError, format!("Type error: {detail}"))
        } else {
            (
                IssueKind::GeneralError,
                format!("CEL compilation error: {detail}"),
            )
        };

        ValidationIssue {
            kind,
            message,
            details: raw.to_string(),
            location: extract_location(raw),
        }
    }
}

/// Compiles `expression` against the names declared by `inputs`
pub fn compile_cel_expression(expression: &str, inputs: &[Input]) -> Result<Program, CompileError> {
    let names: Vec<&str> = inputs.iter().map(Input::name).collect();
    RuleValidator::new().compile(expression, &names)
}

fn environment<S: AsRef<str>>(names: &[S]) -> Environment {
    Environment::with_variables(names.iter().map(|name| name.as_ref().to_string()))
}

fn classify(diagnostics: &[Diagnostic]) -> Vec<ValidationIssue> {
    let validator = RuleValidator::new();
    diagnostics
        .iter()
        .map(|diagnostic| validator.categorize_compilation_error(&diagnostic.to_string()))
        .collect()
}

/// Reads `LINE:COL` from an `<input>:LINE:COL:` annotation
fn extract_location(raw: &str) -> Option<IssueLocation> {
    const ANNOTATION: &str = "<input>:";
    let start = raw.find(ANNOTATION)? + ANNOTATION.len();
    let mut parts = raw[start..].splitn(3, ':');
    let line = parts.next()?.trim().parse().ok()?;
    let column = parts.next()?.trim().parse().ok()?;
    // A third part means the column was terminated by ':'
    parts.next()?;
    Some(IssueLocation { line, column })
}

/// The message without the `ERROR: <input>:L:C:` prefix
fn strip_location(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_error = trimmed.strip_prefix("ERROR:").unwrap_or(trimmed).trim_start();
    match without_error.strip_prefix("<input>:") {
        Some(rest) => rest
            .splitn(3, ':')
            .nth(2)
            .map(str::trim_start)
            .unwrap_or(without_error),
        None => without_error,
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> &'a str {
    match text.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => text[prefix.len()..].trim_start(),
        _ => text,
    }
}

/// Text between the single quotes that follow `marker`
fn quoted_after<'a>(raw: &'a str, marker: &str) -> Option<&'a str> {
    let start = raw.find(marker)? + marker.len();
    let rest = raw[start..].strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{PolicyRule, RuleBuilder};

    fn kinds(issues: &[ValidationIssue]) -> Vec<IssueKind> {
        issues.iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn test_simple_expressions_validate() {
        let validator = RuleValidator::new();
        for expression in [
            "1 + 1 == 2",
            "true && false == false",
            r#""hello" + " " + "world" == "hello world""#,
        ] {
            assert!(
                validator.validate_expression(expression).is_empty(),
                "{expression} should validate"
            );
        }
    }

    #[test]
    fn test_missing_parenthesis_is_syntax_error() {
        let issues = RuleValidator::new().validate_expression("1 + (2 * 3");
        assert_eq!(kinds(&issues), vec![IssueKind::SyntaxError]);
        assert!(issues[0].message.starts_with("Syntax error: "));
        assert_eq!(
            issues[0].location,
            Some(IssueLocation {
                line: 1,
                column: 11
            })
        );
    }

    #[test]
    fn test_undeclared_variable() {
        let issues = RuleValidator::new().validate_expression("undefinedVar == 1");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::UndeclaredReference);
        assert!(issues[0].message.contains("undefinedVar"));
    }

    #[test]
    fn test_mismatched_operands_are_type_errors() {
        let issues = RuleValidator::new().validate_expression(r#"1 + "string""#);
        assert_eq!(kinds(&issues), vec![IssueKind::TypeError]);
        assert!(issues[0].message.starts_with("Type error: "));
    }

    #[test]
    fn test_declared_names() {
        let validator = RuleValidator::new();
        assert!(
            validator
                .validate_expression_with_names(
                    "namespaces.items.all(ns, pods.items.exists(pod, pod.metadata.namespace == ns.metadata.name))",
                    &["namespaces", "pods"],
                )
                .is_empty()
        );
        assert!(
            validator
                .validate_expression_with_names(
                    "pods.items.filter(pod, pod.status.phase == 'Running').size() > 0",
                    &["pods"],
                )
                .is_empty()
        );

        let issues = validator.validate_expression_with_names(
            "deployments.items.all(d, d.spec.replicas > 1)",
            &["pods"],
        );
        assert_eq!(kinds(&issues), vec![IssueKind::UndeclaredReference]);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let validator = RuleValidator::new();
        let expression = "a + b == c && 1 + 'x'";
        let first = validator.validate_expression_with_names(expression, &["a"]);
        let second = validator.validate_expression_with_names(expression, &["a"]);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_custom_functions() {
        let validator = RuleValidator::new();
        assert!(
            validator
                .validate_expression(r#"parseJSON('{"key": "value"}').key == "value""#)
                .is_empty()
        );
        assert!(
            validator
                .validate_expression(r#"parseYAML("key: value").key == "value""#)
                .is_empty()
        );
        assert!(!validator.validate_expression(r#"customFunc("test")"#).is_empty());
    }

    #[test]
    fn test_location_on_multiline_expression() {
        let expression = "\n  pods.items.all(pod,\n    unknownVariable == true\n  )\n";
        let issues = RuleValidator::new().validate_expression_with_names(expression, &["pods"]);
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].location,
            Some(IssueLocation { line: 3, column: 5 })
        );
    }

    #[test]
    fn test_categorize_compilation_error() {
        let validator = RuleValidator::new();
        let cases = [
            (
                "ERROR: <input>:1:1: undeclared reference to 'unknownVar'",
                IssueKind::UndeclaredReference,
                "unknownVar",
            ),
            (
                "ERROR: <input>:1:10: syntax error: unexpected token",
                IssueKind::SyntaxError,
                "Syntax error",
            ),
            (
                "ERROR: type checking failed",
                IssueKind::TypeError,
                "Type error",
            ),
            (
                "Some other error occurred",
                IssueKind::GeneralError,
                "CEL compilation error",
            ),
        ];
        for (raw, kind, fragment) in cases {
            let issue = validator.categorize_compilation_error(raw);
            assert_eq!(issue.kind, kind, "{raw}");
            assert!(issue.message.contains(fragment), "{}", issue.message);
            assert_eq!(issue.details, raw);
        }
    }

    #[test]
    fn test_location_extraction() {
        let validator = RuleValidator::new();
        let issue = validator.categorize_compilation_error("ERROR: <input>:4:17: syntax error: x");
        assert_eq!(issue.location, Some(IssueLocation { line: 4, column: 17 }));
        assert_eq!(issue.message, "Syntax error: x");

        let issue = validator.categorize_compilation_error("no location here");
        assert_eq!(issue.location, None);
    }

    #[test]
    fn test_compile_reports_issue_kinds() {
        let validator = RuleValidator::new();
        assert!(
            validator
                .compile("deployments.items.all(d, d.spec.replicas >= 2)", &["deployments"])
                .is_ok()
        );

        let err = validator
            .compile("pods.items.all(p, p.spec.replicas > 0)", &["deployments"])
            .unwrap_err();
        assert!(err.to_string().contains("UNDECLARED_REFERENCE"));

        let err = validator
            .compile("pods.items.all(p, p.spec.replicas >", &["pods"])
            .unwrap_err();
        assert!(err.to_string().contains("SYNTAX_ERROR"));
    }

    #[test]
    fn test_compile_cel_expression_uses_input_names() {
        let inputs = vec![Input::kubernetes("pods", "", "v1", "pods")];
        let expression = "pods.items.all(pod, pod.spec.containers.all(container,\n  has(container.securityContext) &&\n  has(container.securityContext.runAsNonRoot) &&\n  container.securityContext.runAsNonRoot == true))";
        assert!(compile_cel_expression(expression, &inputs).is_ok());
    }

    #[test]
    fn test_validate_rule() {
        let validator = RuleValidator::new();

        let rule = RuleBuilder::new("test-rule", RuleKind::Cel)
            .with_kubernetes_input("pods", "", "v1", "pods")
            .with_cel_expression("pods.items.all(p, p.spec.containers.size() > 0)")
            .build()
            .unwrap();
        let result = validator.validate_rule(rule.as_ref());
        assert!(result.valid);
        assert!(result.warnings.is_empty());

        let rule = RuleBuilder::new("test-rule", RuleKind::Cel)
            .with_kubernetes_input("pods", "", "v1", "pods")
            .with_cel_expression("deployments.items.all(d, d.spec.replicas > 0)")
            .build()
            .unwrap();
        let result = validator.validate_rule(rule.as_ref());
        assert!(!result.valid);
        assert_eq!(result.issues[0].kind, IssueKind::UndeclaredReference);
    }

    #[test]
    fn test_non_cel_rule_is_valid_with_warning() {
        let rule = PolicyRule::new("policy", RuleKind::Rego, "package main");
        let result = RuleValidator::new().validate_rule(&rule);
        assert!(result.valid);
        assert!(result.issues.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_issue_serializes_type_field() {
        let issue = RuleValidator::new().categorize_compilation_error("ERROR: <input>:1:1: undeclared reference to 'x'");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "UNDECLARED_REFERENCE");
        assert_eq!(json["location"]["line"], 1);
    }
}
