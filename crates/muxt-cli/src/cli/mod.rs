//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names,
//! aliases, help text, and value enums. No business logic lives here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod global;
pub use global::GlobalArgs;

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "muxt",
    bin_name = "muxt",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Generate type-checked axum handlers from template names",
    long_about = "Muxt reads a package's templates variable, parses each \
                  template name as a route, binds routes to receiver \
                  methods, type-checks every template action, and emits \
                  the handler code.",
    after_help = "EXAMPLES:\n\
        \x20 muxt generate --find-receiver-type Server\n\
        \x20 muxt check -C ./site --find-receiver-type Server\n\
        \x20 muxt routes\n\
        \x20 muxt template-source \"GET /\"",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate handler code from template names.
    #[command(
        visible_alias = "g",
        about = "Generate one routes file per templates variable",
        after_help = "EXAMPLES:\n\
            \x20 muxt generate\n\
            \x20 muxt generate --find-receiver-type Server --output-file routes.rs\n\
            \x20 muxt generate --find-templates-variable PUBLIC --find-templates-variable ADMIN"
    )]
    Generate(GenerateArgs),

    /// Run the static checks without writing anything.
    #[command(
        visible_alias = "c",
        about = "Type-check templates, routes, and bindings",
        after_help = "EXAMPLES:\n\
            \x20 muxt check\n\
            \x20 muxt check --find-receiver-type Server"
    )]
    Check(PipelineArgs),

    /// Print the resolved route table.
    #[command(about = "Print every route, its binding, and its template")]
    Routes(PipelineArgs),

    /// For each template, print everything that renders it.
    #[command(about = "Cross-reference: who renders each template")]
    TemplateCallers(NamedReportArgs),

    /// For each template, print every template it invokes.
    #[command(about = "Cross-reference: what each template invokes")]
    TemplateCalls(NamedReportArgs),

    /// Print one template's source text.
    #[command(about = "Print a template's source")]
    TemplateSource(SourceArgs),

    /// Print an overview combining routes, methods, and template source.
    #[command(about = "Print combined route documentation")]
    Documentation(PipelineArgs),

    /// Print the muxt version.
    #[command(about = "Print the build version")]
    Version,

    /// Generate shell completion scripts.
    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n\
            \x20 muxt completions bash > ~/.local/share/bash-completion/completions/muxt\n\
            \x20 muxt completions zsh  > ~/.zfunc/_muxt"
    )]
    Completions(CompletionsArgs),
}

// ── shared pipeline flags ─────────────────────────────────────────────────────

/// Flags shared by every command that runs the analysis pipeline.
/// Legacy spellings are accepted as visible aliases.
#[derive(Debug, Args, Clone)]
pub struct PipelineArgs {
    /// Receiver type whose methods implement the routes.
    #[arg(
        long = "find-receiver-type",
        visible_alias = "receiver-type",
        value_name = "IDENT",
        help = "Receiver type implementing route methods"
    )]
    pub receiver_type: Option<String>,

    /// Package directory to load the receiver type from, when it lives
    /// outside the templates package.
    #[arg(
        long = "find-receiver-type-package",
        visible_alias = "receiver-package",
        value_name = "DIR",
        help = "Package directory containing the receiver type"
    )]
    pub receiver_package: Option<PathBuf>,

    /// Templates variable identifier; may repeat for packages declaring
    /// several variables.
    #[arg(
        long = "find-templates-variable",
        visible_alias = "templates-variable",
        value_name = "IDENT",
        help = "Templates variable to analyze (repeatable)"
    )]
    pub templates_variable: Vec<String>,
}

impl PipelineArgs {
    /// The variables to analyze; defaults to `TEMPLATES`.
    pub fn variables(&self) -> Vec<String> {
        if self.templates_variable.is_empty() {
            vec![muxt_core::DEFAULT_TEMPLATES_VARIABLE.to_string()]
        } else {
            self.templates_variable.clone()
        }
    }
}

// ── generate ──────────────────────────────────────────────────────────────────

/// Arguments for `muxt generate`.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Output file name; must end in `.rs`. Only valid with a single
    /// templates variable.
    #[arg(
        long = "output-file",
        visible_alias = "out",
        value_name = "FILENAME.rs",
        help = "Generated file name (default: <variable>_routes.rs)"
    )]
    pub output_file: Option<PathBuf>,

    /// Name of the generated registration function.
    #[arg(
        long = "output-routes-func",
        visible_alias = "routes-func",
        value_name = "IDENT",
        help = "Registration function name (default: routes)"
    )]
    pub routes_func: Option<String>,

    /// Name of the generated receiver trait.
    #[arg(
        long = "output-receiver-interface",
        visible_alias = "receiver-interface",
        value_name = "IDENT",
        help = "Receiver trait name (default: RoutesReceiver)"
    )]
    pub receiver_interface: Option<String>,

    /// Name of the generated template-data type.
    #[arg(
        long = "output-template-data-type",
        visible_alias = "template-data-type",
        value_name = "IDENT",
        help = "Template data type name (default: TemplateData)"
    )]
    pub template_data_type: Option<String>,
}

// ── reports ───────────────────────────────────────────────────────────────────

/// Arguments for the cross-reference reports.
#[derive(Debug, Args)]
pub struct NamedReportArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Restrict the report to one template.
    #[arg(value_name = "TEMPLATE", help = "Template name to report on")]
    pub name: Option<String>,
}

/// Arguments for `muxt template-source`.
#[derive(Debug, Args)]
pub struct SourceArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// The template whose source to print.
    #[arg(value_name = "TEMPLATE", help = "Template name")]
    pub name: String,
}

// ── completions ───────────────────────────────────────────────────────────────

/// Arguments for `muxt completions`.
#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_generate_with_long_flags() {
        let cli = Cli::parse_from([
            "muxt",
            "generate",
            "--find-receiver-type",
            "Server",
            "--output-file",
            "routes.rs",
        ]);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.pipeline.receiver_type.as_deref(), Some("Server"));
        assert_eq!(args.output_file.unwrap().to_str(), Some("routes.rs"));
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let cli = Cli::parse_from([
            "muxt",
            "generate",
            "--receiver-type",
            "Server",
            "--routes-func",
            "register",
        ]);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.pipeline.receiver_type.as_deref(), Some("Server"));
        assert_eq!(args.routes_func.as_deref(), Some("register"));
    }

    #[test]
    fn templates_variable_repeats() {
        let cli = Cli::parse_from([
            "muxt",
            "check",
            "--find-templates-variable",
            "PUBLIC",
            "--find-templates-variable",
            "ADMIN",
        ]);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.variables(), vec!["PUBLIC", "ADMIN"]);
    }

    #[test]
    fn variables_default_to_templates() {
        let cli = Cli::parse_from(["muxt", "check"]);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.variables(), vec!["TEMPLATES"]);
    }

    #[test]
    fn chdir_is_global() {
        let cli = Cli::parse_from(["muxt", "routes", "-C", "/tmp/site"]);
        assert_eq!(cli.global.chdir.unwrap().to_str(), Some("/tmp/site"));
    }

    #[test]
    fn template_source_requires_a_name() {
        assert!(Cli::try_parse_from(["muxt", "template-source"]).is_err());
        let cli = Cli::parse_from(["muxt", "template-source", "GET /"]);
        let Commands::TemplateSource(args) = cli.command else {
            panic!("expected template-source");
        };
        assert_eq!(args.name, "GET /");
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        // clap should reject --quiet --verbose together
        let result = Cli::try_parse_from(["muxt", "--quiet", "--verbose", "routes"]);
        assert!(result.is_err());
    }
}
