//! # Muxt CLI
//!
//! Turns named HTML templates into type-checked axum handlers.
//!
//! ## Startup sequence
//!
//! 1. Parse CLI arguments (clap handles `--help` / `--version` early-exit).
//! 2. Initialise the tracing subscriber (logging).
//! 3. Build the [`OutputManager`].
//! 4. Dispatch to the appropriate command handler.
//! 5. Translate any [`CliError`] into a user-facing message and exit code.
//!
//! ## Exit codes
//!
//! | Code | Meaning                                  |
//! |------|------------------------------------------|
//! |  0   | Success                                  |
//! |  1   | Any error (parse, check, I/O, bad flag)  |

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info, instrument};

use crate::{
    cli::{Cli, Commands},
    error::{CliError, CliResult},
    logging::init_logging,
    output::OutputManager,
};

mod cli;
mod commands;
mod error;
mod logging;
mod output;

fn main() -> ExitCode {
    // ── 1. Parse arguments ────────────────────────────────────────────────
    // clap handles --help / --version and exits automatically; errors here
    // are argument-parse failures.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Render clap's own error (already user-friendly) and exit 1.
            eprintln!("{}", e.render().ansi());
            return ExitCode::from(1);
        }
    };

    // ── 2. Initialise tracing ─────────────────────────────────────────────
    if let Err(e) = init_logging(&cli.global) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::from(1);
    }

    debug!(
        verbose = cli.global.verbose,
        quiet = cli.global.quiet,
        chdir = ?cli.global.chdir,
        "CLI started"
    );

    // ── 3. Build output manager ───────────────────────────────────────────
    let output = OutputManager::new(&cli.global);

    // ── 4. Dispatch + 5. Error handling ───────────────────────────────────
    match run(cli, output) {
        Ok(()) => {
            info!("muxt completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => handle_error(e, false),
    }
}

/// Dispatch to the correct command handler.
#[instrument(skip_all)]
fn run(cli: Cli, output: OutputManager) -> CliResult<()> {
    match cli.command {
        Commands::Generate(cmd) => commands::generate::execute(cmd, &cli.global, &output),
        Commands::Check(cmd) => commands::check::execute(cmd, &cli.global, &output),
        Commands::Routes(cmd) => commands::routes::execute(cmd, &cli.global, &output),
        Commands::TemplateCallers(cmd) => commands::callers::execute(cmd, &cli.global, &output),
        Commands::TemplateCalls(cmd) => commands::calls::execute(cmd, &cli.global, &output),
        Commands::TemplateSource(cmd) => commands::source::execute(cmd, &cli.global, &output),
        Commands::Documentation(cmd) => {
            commands::documentation::execute(cmd, &cli.global, &output)
        }
        Commands::Version => commands::version(&output),
        Commands::Completions(cmd) => commands::completions::execute(cmd),
    }
}

/// Translate a `CliError` into a user message and the exit code.
///
/// This is the single place where structured errors become human-readable
/// output; the format/suggestion machinery in `CliError` is all exercised
/// here. Every error path exits 1.
fn handle_error(err: CliError, verbose: bool) -> ExitCode {
    // 1. Emit a structured log event at the right severity.
    err.log();

    // 2. Print a user-friendly message. We write directly to stderr so the
    //    message appears even when stdout is redirected.
    let msg = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        err.format_colored(verbose)
    } else {
        err.format_plain(verbose)
    };
    eprint!("{msg}");

    ExitCode::from(err.exit_code())
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_structure_is_valid() {
        // Clap's internal consistency check — catches missing values, conflicts, etc.
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_version_matches_cargo() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_version(), Some(env!("CARGO_PKG_VERSION")));
    }
}
