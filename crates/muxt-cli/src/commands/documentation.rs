//! Implementation of the `muxt documentation` command.

use tracing::instrument;

use crate::cli::{GlobalArgs, PipelineArgs};
use crate::error::CliResult;
use crate::output::OutputManager;

#[instrument(skip_all)]
pub fn execute(args: PipelineArgs, global: &GlobalArgs, output: &OutputManager) -> CliResult<()> {
    let package = super::load_package(global)?;
    for var in args.variables() {
        let analysis = super::run_analysis(&package, &args, &var)?;
        for line in analysis.documentation().lines() {
            output.report(line)?;
        }
    }
    Ok(())
}
