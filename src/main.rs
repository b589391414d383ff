//! Compliance scanner CLI entry point

use clap::Parser;
use compliance_scanner::cli::{self, Cli, Command};
use std::process;

fn main() {
    let cli = Cli::parse();

    let debug = matches!(&cli.command, Command::Scan(args) if args.debug);
    cli::init_tracing(debug);

    let exit_code = match &cli.command {
        Command::Scan(args) => cli::scan::run_scan(args, cli.color),
        Command::Validate(args) => cli::validate::run_validate(args),
    };

    process::exit(exit_code);
}
