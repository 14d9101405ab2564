//! clic - cache the output of commands
//!
//! Runs a command and stores its output in a SQLite database; identical
//! invocations within the TTL print the stored output instead.

use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use clic::app;
use clic::cli::{Cli, Settings};

/// Sets up logging to stderr; stdout is reserved for command output.
///
/// `RUST_LOG` wins over the verbosity flag when set.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();
}

fn write_output(output: &[u8]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(output)?;
    stdout.flush()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("clic: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(settings.verbose);

    match app::run(&settings) {
        Ok(Some(output)) => match write_output(&output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("clic: cannot write output: {err}");
                ExitCode::FAILURE
            }
        },
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("clic: {err}");
            ExitCode::FAILURE
        }
    }
}
