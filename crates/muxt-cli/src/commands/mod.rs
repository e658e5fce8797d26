//! Command handlers.
//!
//! Every pipeline command shares the same skeleton: load the package at the
//! `-C` directory, run the analysis for each requested templates variable,
//! and render a view of the result. The shared plumbing lives here.

pub mod callers;
pub mod calls;
pub mod check;
pub mod completions;
pub mod documentation;
pub mod generate;
pub mod routes;
pub mod source;

use muxt_core::analyze::{Analysis, AnalysisOptions, analyze};
use muxt_core::source::Package;

use crate::cli::{GlobalArgs, PipelineArgs};
use crate::error::{CliError, CliResult, require_identifier};
use crate::output::OutputManager;

/// Load the package named by `-C` (default: the current directory).
pub(crate) fn load_package(global: &GlobalArgs) -> CliResult<Package> {
    let dir = global.package_dir();
    Package::load(&dir).map_err(|e| CliError::Core(e.into()))
}

/// Validate pipeline flags and build [`AnalysisOptions`] for one variable.
pub(crate) fn analysis_options(
    pipeline: &PipelineArgs,
    var: &str,
) -> CliResult<AnalysisOptions> {
    require_identifier("--find-templates-variable", var)?;
    if let Some(receiver) = &pipeline.receiver_type {
        require_identifier("--find-receiver-type", receiver)?;
    }
    Ok(AnalysisOptions {
        templates_variable: var.to_string(),
        receiver_type: pipeline.receiver_type.clone(),
        receiver_package: pipeline.receiver_package.clone(),
    })
}

/// Run the full pipeline for one templates variable.
pub(crate) fn run_analysis(
    package: &Package,
    pipeline: &PipelineArgs,
    var: &str,
) -> CliResult<Analysis> {
    let opts = analysis_options(pipeline, var)?;
    analyze(package, &opts).map_err(CliError::Core)
}

/// Fail when the analysis collected diagnostics.
pub(crate) fn require_clean(analysis: &Analysis) -> CliResult<()> {
    if analysis.errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::Failures(analysis.errors.clone()))
    }
}

/// The `version` command: print the build identifier, or fail when the
/// build carries none.
pub fn version(output: &OutputManager) -> CliResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    if version.is_empty() {
        return Err(CliError::InvalidInput {
            message: "this build has no version identifier".into(),
        });
    }
    output.report(&format!("muxt {version}"))?;
    Ok(())
}
