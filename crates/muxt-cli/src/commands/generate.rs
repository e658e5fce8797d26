//! Implementation of the `muxt generate` command.
//!
//! One generated file per templates variable, written atomically into the
//! package directory. Any collected diagnostic aborts generation before a
//! single byte is written — a package either generates completely or not at
//! all.

use std::path::PathBuf;

use tracing::{debug, instrument};

use muxt_core::emit::{self, EmitConfig};

use crate::cli::{GenerateArgs, GlobalArgs};
use crate::error::{CliError, CliResult, require_identifier};
use crate::output::OutputManager;

#[instrument(skip_all)]
pub fn execute(args: GenerateArgs, global: &GlobalArgs, output: &OutputManager) -> CliResult<()> {
    // Step 1 — validate name-shaped flags before touching the filesystem.
    for (flag, value) in [
        ("--output-routes-func", &args.routes_func),
        ("--output-receiver-interface", &args.receiver_interface),
        ("--output-template-data-type", &args.template_data_type),
    ] {
        if let Some(value) = value {
            require_identifier(flag, value)?;
        }
    }
    if let Some(path) = &args.output_file {
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            return Err(CliError::InvalidOutputFile { path: path.clone() });
        }
    }

    let variables = args.pipeline.variables();
    if args.output_file.is_some() && variables.len() > 1 {
        return Err(CliError::InvalidInput {
            message: "--output-file cannot be combined with several templates variables".into(),
        });
    }

    // Step 2 — analyze and emit, one file per variable.
    let package = super::load_package(global)?;
    for var in &variables {
        let analysis = super::run_analysis(&package, &args.pipeline, var)?;
        super::require_clean(&analysis)?;

        // Unused templates don't block generation; `muxt check` treats
        // them as failures.
        for name in analysis.unused_templates() {
            output.warning(&format!("template {name:?} is defined but never rendered"))?;
        }

        let cfg = EmitConfig {
            routes_fn: args.routes_func.clone().unwrap_or_else(|| "routes".into()),
            receiver_interface: args
                .receiver_interface
                .clone()
                .unwrap_or_else(|| "RoutesReceiver".into()),
            data_type: args
                .template_data_type
                .clone()
                .unwrap_or_else(|| "TemplateData".into()),
            templates_var: var.clone(),
        };
        let code = emit::generate(&analysis.routes, &cfg);

        let file_name = args
            .output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_routes.rs", var.to_lowercase())));
        let path = global.package_dir().join(file_name);
        debug!(path = %path.display(), routes = analysis.routes.len(), "emitting");
        emit::write_atomic(&path, &code).map_err(CliError::Core)?;

        output.success(&format!(
            "wrote {} ({} routes from {})",
            path.display(),
            analysis.routes.len(),
            var
        ))?;
    }
    Ok(())
}
