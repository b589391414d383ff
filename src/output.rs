//! Output formatters (human and JSON)

pub mod human;
pub mod json;

pub use human::{HumanFormatter, Summary};
pub use json::JsonFormatter;
