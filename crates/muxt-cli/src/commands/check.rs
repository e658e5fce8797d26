//! Implementation of the `muxt check` command.
//!
//! Runs the whole pipeline read-only. Route errors, binding errors, and
//! template type errors are collected and printed together; unused
//! templates are diagnostics too — `check` is the command that keeps a
//! template set honest.

use tracing::instrument;

use muxt_core::check::CheckError;
use muxt_core::error::SourcePos;

use crate::cli::{GlobalArgs, PipelineArgs};
use crate::error::{CliError, CliResult};
use crate::output::OutputManager;

#[instrument(skip_all)]
pub fn execute(args: PipelineArgs, global: &GlobalArgs, output: &OutputManager) -> CliResult<()> {
    let package = super::load_package(global)?;
    let mut checked = 0usize;

    for var in args.variables() {
        let analysis = super::run_analysis(&package, &args, &var)?;
        let mut errors = analysis.errors.clone();

        // Unused templates are fatal under check.
        for name in analysis.unused_templates() {
            let pos = analysis
                .environment
                .set
                .find_tree(&name)
                .map(|tree| SourcePos::new(tree.parse_name.clone(), 1, 1, 0))
                .unwrap_or_else(|| SourcePos::new(analysis.environment.file.display().to_string(), 1, 1, 0));
            errors.push(CheckError {
                pos,
                message: format!("template {name:?} is defined but never rendered"),
            });
        }

        if !errors.is_empty() {
            output.error(&format!("{var}: {} problem(s)", errors.len()))?;
            return Err(CliError::Failures(errors));
        }
        checked += analysis.routes.len();
        output.print(&format!(
            "{var}: {} routes, {} templates, ok",
            analysis.routes.len(),
            analysis.environment.set.trees().len()
        ))?;
    }

    output.success(&format!("check passed ({checked} routes)"))?;
    Ok(())
}
