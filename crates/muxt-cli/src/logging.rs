//! Tracing subscriber setup for the muxt binary.
//!
//! The library crates (`muxt_core`, `muxt_templates`) only *emit* events;
//! installing the subscriber is this module's job and happens exactly once,
//! at startup.
//!
//! muxt is a short-lived generator, so the default is quiet (warnings
//! only) and each `-v` opens up one more band of the pipeline's own
//! tracing: `-v` for per-stage progress, `-vv` for the loader/evaluator/
//! checker debug events, `-vvv` for everything. `--quiet` narrows to
//! errors. An explicit `RUST_LOG` always wins over the flags.
//!
//! Log lines go to stderr without timestamps — a single-shot tool's
//! timestamps are noise, and stdout must stay clean for piped reports.

use std::io::IsTerminal as _;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::GlobalArgs;

/// The crates whose events the verbosity flags govern.
const TRACED_CRATES: [&str; 3] = ["muxt", "muxt_core", "muxt_templates"];

/// Install the global subscriber. Call once, before any tracing macro
/// fires; a second call (test binaries sharing a process) is reported as
/// an error rather than a panic.
pub fn init_logging(args: &GlobalArgs) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::new(filter_directives(args)),
    };

    let use_ansi = !args.no_color && std::io::stderr().is_terminal();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_target(true)
        .with_ansi(use_ansi)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise tracing: {e}"))?;

    Ok(())
}

/// One `crate=level` directive per traced crate, comma-joined, so a `-vv`
/// run raises the whole pipeline together without touching dependencies'
/// own logging.
fn filter_directives(args: &GlobalArgs) -> String {
    let level = verbosity_level(args);
    TRACED_CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Collapse the `--quiet`/`-v` pair into one filter level. `--quiet`
/// dominates; clap already rejects combining the two flags, but the
/// mapping must not rely on that.
fn verbosity_level(args: &GlobalArgs) -> &'static str {
    match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(verbose: u8, quiet: bool) -> GlobalArgs {
        GlobalArgs {
            chdir: None,
            verbose,
            quiet,
            no_color: true,
        }
    }

    #[test]
    fn each_v_opens_one_band() {
        let ladder = [(0, "warn"), (1, "info"), (2, "debug"), (3, "trace")];
        for (count, level) in ladder {
            assert_eq!(verbosity_level(&flags(count, false)), level, "-v x{count}");
        }
        // Past -vvv there is nothing left to open.
        assert_eq!(verbosity_level(&flags(9, false)), "trace");
    }

    #[test]
    fn quiet_dominates_even_with_verbose_set() {
        assert_eq!(verbosity_level(&flags(0, true)), "error");
        assert_eq!(verbosity_level(&flags(5, true)), "error");
    }

    #[test]
    fn directives_name_every_pipeline_crate_at_one_level() {
        assert_eq!(
            filter_directives(&flags(1, false)),
            "muxt=info,muxt_core=info,muxt_templates=info"
        );
        assert_eq!(
            filter_directives(&flags(0, true)),
            "muxt=error,muxt_core=error,muxt_templates=error"
        );
    }
}
