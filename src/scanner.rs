#![forbid(unsafe_code)]

//! Scan orchestration, cancellation and results

mod context;
mod orchestrator;
mod result;

pub use context::ScanContext;
pub use orchestrator::{ScanConfig, Scanner};
pub use result::{CheckResult, CheckStatus, load_results, save_results};
