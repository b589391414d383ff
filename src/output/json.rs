#![forbid(unsafe_code)]

//! JSON output formatter
//!
//! Emits the same structure `save_results` writes: a pretty-printed array of
//! check results in submission order.

use crate::scanner::CheckResult;

/// JSON output formatter
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter
    }

    pub fn format(&self, results: &[CheckResult]) -> Result<String, serde_json::Error> {
        let mut output = serde_json::to_string_pretty(results)?;
        output.push('\n');
        Ok(output)
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}
