//! Implementation of the `muxt routes` command.

use tracing::instrument;

use crate::cli::{GlobalArgs, PipelineArgs};
use crate::error::CliResult;
use crate::output::OutputManager;

#[instrument(skip_all)]
pub fn execute(args: PipelineArgs, global: &GlobalArgs, output: &OutputManager) -> CliResult<()> {
    let package = super::load_package(global)?;
    for var in args.variables() {
        let analysis = super::run_analysis(&package, &args, &var)?;
        super::require_clean(&analysis)?;
        if args.variables().len() > 1 {
            output.header(&format!("# {var}"))?;
        }
        for line in analysis.routes_report().lines() {
            output.report(line)?;
        }
    }
    Ok(())
}
