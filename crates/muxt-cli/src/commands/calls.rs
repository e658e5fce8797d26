//! Implementation of the `muxt template-calls` command.

use tracing::instrument;

use crate::cli::{GlobalArgs, NamedReportArgs};
use crate::error::{CliError, CliResult};
use crate::output::OutputManager;

#[instrument(skip_all)]
pub fn execute(
    args: NamedReportArgs,
    global: &GlobalArgs,
    output: &OutputManager,
) -> CliResult<()> {
    let package = super::load_package(global)?;
    for var in args.pipeline.variables() {
        let analysis = super::run_analysis(&package, &args.pipeline, &var)?;
        if let Some(name) = &args.name {
            if analysis.environment.set.find_tree(name).is_none() {
                return Err(CliError::TemplateNotFound { name: name.clone() });
            }
        }
        for line in analysis.template_calls(args.name.as_deref()).lines() {
            output.report(line)?;
        }
    }
    Ok(())
}
