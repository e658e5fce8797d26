//! Implementation of the `muxt template-source` command.

use tracing::instrument;

use crate::cli::{GlobalArgs, SourceArgs};
use crate::error::{CliError, CliResult};
use crate::output::OutputManager;

#[instrument(skip_all)]
pub fn execute(args: SourceArgs, global: &GlobalArgs, output: &OutputManager) -> CliResult<()> {
    let package = super::load_package(global)?;
    for var in args.pipeline.variables() {
        let analysis = super::run_analysis(&package, &args.pipeline, &var)?;
        match analysis.template_source(&args.name) {
            Some(source) => {
                output.report(&source)?;
                return Ok(());
            }
            None => continue,
        }
    }
    Err(CliError::TemplateNotFound {
        name: args.name.clone(),
    })
}
