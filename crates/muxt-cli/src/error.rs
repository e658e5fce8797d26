//! Comprehensive error handling for the muxt CLI.
//!
//! Provides structured errors with:
//! - User-friendly messages
//! - Actionable suggestions
//! - Proper error chaining
//! - A single exit code: every failure exits 1

use std::error::Error;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use thiserror::Error;

use muxt_core::error::{ErrorCategory as CoreCategory, ErrorList, MuxtError};

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Comprehensive CLI error types.
#[derive(Debug, Error)]
pub enum CliError {
    /// A flag value is not a valid Rust identifier.
    #[error("invalid identifier {value:?} for {flag}")]
    InvalidIdentifier { flag: String, value: String },

    /// `--output-file` must name a `.rs` file.
    #[error("output file {path} must end in .rs")]
    InvalidOutputFile { path: PathBuf },

    /// Invalid combination of inputs.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The named template does not exist.
    #[error("template not found: {name:?}")]
    TemplateNotFound { name: String },

    /// A single unrecoverable analyzer error.
    #[error(transparent)]
    Core(#[from] MuxtError),

    /// Diagnostics collected across one package pass.
    #[error("{0}")]
    Failures(ErrorList),

    /// An I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl CliError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidIdentifier { flag, .. } => vec![
                format!("{flag} takes a plain Rust identifier"),
                "Examples: Server, routes, TemplateData".into(),
            ],
            Self::InvalidOutputFile { .. } => vec![
                "Generated code is a Rust module; name it like routes.rs".into(),
            ],
            Self::InvalidInput { .. } => {
                vec!["Use --help for usage information".into()]
            }
            Self::TemplateNotFound { .. } => vec![
                "List defined templates with: muxt template-callers".into(),
            ],
            Self::Core(core) => core.suggestions(),
            Self::Failures(list) => vec![
                format!("{} problem(s) found", list.len()),
                "Each line above carries a file:line:column position".into(),
            ],
            Self::Io { message, .. } => vec![
                format!("I/O operation failed: {message}"),
                "Check file permissions and paths".into(),
            ],
        }
    }

    /// The exit code. The command surface promises 0 on success and 1 on
    /// any error, so this is constant; it exists to keep the call sites
    /// honest about the contract.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Format the error for display with colors and suggestions.
    pub fn format_colored(&self, verbose: bool) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\n{} {}\n\n",
            "\u{2717}".red().bold(), // ✗
            "Error:".red().bold()
        ));

        for line in self.to_string().lines() {
            output.push_str(&format!("  {}\n", line.red()));
        }

        // Error chain (if verbose)
        if verbose {
            let mut source = self.source();
            while let Some(err) = source {
                output.push_str(&format!(
                    "\n  {} {}\n",
                    "→".dimmed(),
                    err.to_string().dimmed()
                ));
                source = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str(&format!("\n{}\n", "Suggestions:".yellow().bold()));
            for suggestion in suggestions {
                output.push_str(&format!("  {suggestion}\n"));
            }
        }

        output
    }

    /// Plain-text version of [`Self::format_colored`] — no ANSI codes.
    pub fn format_plain(&self, verbose: bool) -> String {
        let mut out = String::new();
        out.push_str("\nError:\n");
        for line in self.to_string().lines() {
            out.push_str(&format!("  {line}\n"));
        }

        if verbose {
            let mut src = Error::source(self);
            while let Some(err) = src {
                out.push_str(&format!("  Caused by: {err}\n"));
                src = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\nSuggestions:\n");
            for s in &suggestions {
                out.push_str(&format!("  {s}\n"));
            }
        }

        out
    }

    /// Log the error using tracing.
    pub fn log(&self) {
        match self {
            Self::Core(core) => match core.category() {
                CoreCategory::Package | CoreCategory::Io => {
                    tracing::error!("{core}")
                }
                _ => tracing::warn!("{core}"),
            },
            Self::Failures(list) => tracing::warn!("{} diagnostics collected", list.len()),
            other => tracing::warn!("{other}"),
        }
    }
}

/// Validate an identifier-valued flag.
pub fn require_identifier(flag: &str, value: &str) -> CliResult<()> {
    let mut chars = value.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(CliError::InvalidIdentifier {
            flag: flag.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(require_identifier("--output-routes-func", "routes").is_ok());
        assert!(require_identifier("--output-routes-func", "_private").is_ok());
        assert!(require_identifier("--output-routes-func", "Routes2").is_ok());
        assert!(require_identifier("--output-routes-func", "9lives").is_err());
        assert!(require_identifier("--output-routes-func", "has space").is_err());
        assert!(require_identifier("--output-routes-func", "").is_err());
        assert!(require_identifier("--output-routes-func", "a::b").is_err());
    }

    #[test]
    fn every_error_exits_one() {
        let errors = [
            CliError::InvalidInput {
                message: "x".into(),
            },
            CliError::TemplateNotFound { name: "t".into() },
            CliError::InvalidOutputFile {
                path: PathBuf::from("routes.txt"),
            },
        ];
        for err in errors {
            assert_eq!(err.exit_code(), 1);
        }
    }

    #[test]
    fn format_plain_contains_suggestions() {
        let err = CliError::InvalidIdentifier {
            flag: "--output-routes-func".into(),
            value: "9lives".into(),
        };
        let text = err.format_plain(false);
        assert!(text.contains("Error:"));
        assert!(text.contains("Suggestions:"));
        assert!(text.contains("identifier"));
    }

    #[test]
    fn failures_list_renders_every_line() {
        let mut list = ErrorList::default();
        list.push(MuxtError::Emit {
            path: PathBuf::from("a.rs"),
            message: "one".into(),
        });
        list.push(MuxtError::Emit {
            path: PathBuf::from("b.rs"),
            message: "two".into(),
        });
        let err = CliError::Failures(list);
        let text = err.format_plain(false);
        assert!(text.contains("a.rs"));
        assert!(text.contains("b.rs"));
    }
}
