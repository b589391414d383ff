//! Validate command implementation
//!
//! Checks a single expression against a set of input names, or every rule
//! file in a directory, without fetching any data.

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::cli::common::{EXIT_ERROR, EXIT_FAILED, EXIT_SUCCESS, load_rules, rule_error_exit_code};
use crate::validation::{RuleValidator, ValidationResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Validation outcome for one rule file entry
#[derive(Debug, Serialize)]
struct RuleReport {
    id: String,
    #[serde(flatten)]
    result: ValidationResult,
}

/// Run the validate command
///
/// # Returns
///
/// Exit code:
/// - 0: everything is valid
/// - 1: at least one issue was found
/// - 2/3: the rules directory could not be read or parsed
pub fn run_validate(args: &ValidateArgs) -> i32 {
    let validator = RuleValidator::new();

    let reports = match (&args.expression, &args.rules) {
        (Some(expression), _) => {
            let issues = validator.validate_expression_with_names(expression, &args.inputs);
            vec![RuleReport {
                id: String::new(),
                result: ValidationResult {
                    valid: issues.is_empty(),
                    issues,
                    warnings: Vec::new(),
                },
            }]
        }
        (None, Some(dir)) => match load_rules(dir) {
            Ok(rules) => rules
                .iter()
                .map(|rule| RuleReport {
                    id: rule.id().to_string(),
                    result: validator.validate_rule(rule.as_ref()),
                })
                .collect(),
            Err(e) => {
                eprintln!("Error: {}", e);
                return rule_error_exit_code(&e);
            }
        },
        (None, None) => {
            eprintln!("Error: nothing to validate");
            return EXIT_ERROR;
        }
    };

    match args.format {
        OutputFormat::Human => print_human_output(&reports),
        OutputFormat::Json => {
            if args.expression.is_some() {
                print_json(&reports[0].result);
            } else {
                let by_id: BTreeMap<&str, &ValidationResult> = reports
                    .iter()
                    .map(|report| (report.id.as_str(), &report.result))
                    .collect();
                print_json(&by_id);
            }
        }
    }

    if reports.iter().all(|report| report.result.valid) {
        EXIT_SUCCESS
    } else {
        EXIT_FAILED
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn print_human_output(reports: &[RuleReport]) {
    for report in reports {
        let label = if report.id.is_empty() {
            "Expression".to_string()
        } else {
            format!("Rule '{}'", report.id)
        };

        if report.result.valid {
            println!("{label} is valid");
        } else {
            println!("{label} has {} issue(s):", report.result.issues.len());
        }
        for issue in &report.result.issues {
            println!("  {}", issue);
        }
        for warning in &report.result.warnings {
            println!("  warning: {}", warning);
        }
    }
}
