//! CLI dispatch: route the parsed subcommand to its handler.

use anyhow::Result;
use std::process::ExitCode;

use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::handlers::{handle_convert, handle_pipeline, handle_watch};

/// Run the selected subcommand. The exit code reflects per-file or per-step failures.
pub fn handle_run(cli: &Cli) -> Result<ExitCode> {
    let verbose = cli.verbose();
    match &cli.command {
        Commands::Convert(args) => handle_convert(args, verbose),
        Commands::Pipeline(args) => handle_pipeline(args, verbose),
        Commands::Watch(args) => handle_watch(args, verbose),
    }
}
