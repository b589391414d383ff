//! Scan settings file parsing and validation

pub mod scan_toml;

pub use scan_toml::{ColorOption, OutputConfig, OutputFormat, ScanSection, ScanSettings};
