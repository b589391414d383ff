#![forbid(unsafe_code)]

//! Human-readable result formatter
//!
//! One line per rule with a colored status, followed by the failure message
//! and any warnings, then a summary line.

use crate::scanner::{CheckResult, CheckStatus};
use std::io;
use termcolor::{Color, ColorSpec, NoColor, WriteColor};

/// Per-status counts over a result list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub not_applicable: usize,
}

impl Summary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.status {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Fail => summary.failed += 1,
                CheckStatus::Error => summary.errors += 1,
                CheckStatus::NotApplicable => summary.not_applicable += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.not_applicable
    }

    /// True when nothing failed or errored
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

/// Human-readable formatter for check results
pub struct HumanFormatter;

impl HumanFormatter {
    pub fn new() -> Self {
        HumanFormatter
    }

    /// Writes `results` to a color-capable stream
    pub fn write<W: WriteColor>(&self, out: &mut W, results: &[CheckResult]) -> io::Result<()> {
        let width = results.iter().map(|r| r.id.len()).max().unwrap_or(0);

        for result in results {
            out.set_color(&status_color(result.status))?;
            write!(out, "{:<14}", result.status.as_str())?;
            out.reset()?;

            write!(out, " {:<width$}", result.id)?;
            if !result.metadata.name.is_empty() {
                write!(out, "  {}", result.metadata.name)?;
            }
            writeln!(out)?;

            if !result.error_message.is_empty() {
                writeln!(out, "    {}", result.error_message)?;
            }
            for warning in &result.warnings {
                if *warning == result.error_message {
                    continue;
                }
                out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                write!(out, "    warning:")?;
                out.reset()?;
                writeln!(out, " {}", warning)?;
            }
        }

        let summary = Summary::from_results(results);
        writeln!(out)?;
        let mut spec = ColorSpec::new();
        spec.set_bold(true);
        out.set_color(&spec)?;
        writeln!(
            out,
            "{} rules: {} passed, {} failed, {} errors, {} not applicable",
            summary.total(),
            summary.passed,
            summary.failed,
            summary.errors,
            summary.not_applicable
        )?;
        out.reset()
    }

    /// Plain-text rendering, used where no terminal is involved
    pub fn format(&self, results: &[CheckResult]) -> String {
        let mut buffer = NoColor::new(Vec::new());
        // Writing into a Vec cannot fail
        let _ = self.write(&mut buffer, results);
        String::from_utf8_lossy(&buffer.into_inner()).into_owned()
    }
}

impl Default for HumanFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn status_color(status: CheckStatus) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_bold(true);
    match status {
        CheckStatus::Pass => spec.set_fg(Some(Color::Green)),
        CheckStatus::Fail => spec.set_fg(Some(Color::Red)),
        CheckStatus::Error => spec.set_fg(Some(Color::Magenta)),
        CheckStatus::NotApplicable => spec.set_fg(Some(Color::Cyan)),
    };
    spec
}
