//! CLI argument parsing and command dispatch

pub mod args;
pub mod common;
pub mod scan;
pub mod validate;

// Re-export types for convenient access
pub use args::{Cli, ColorChoice, Command, OutputFormat, ScanArgs, ValidateArgs};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the stderr log subscriber
///
/// `RUST_LOG` wins when set; otherwise `debug` selects between debug and
/// warn level for this crate.
pub fn init_tracing(debug: bool) {
    let filter = if debug {
        "compliance_scanner=debug"
    } else {
        "compliance_scanner=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}
