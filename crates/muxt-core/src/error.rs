//! Unified error handling for the analyzer.
//!
//! Each pipeline stage has its own `thiserror` enum; [`MuxtError`] wraps
//! them so the CLI needs a single surface. Recoverable diagnostics are
//! *collected* in an [`ErrorList`] and reported together; unrecoverable ones
//! (package won't load, templates variable missing) short-circuit through
//! `?`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::check::CheckError;
use crate::environment::EnvironmentError;
use crate::resolve::ResolveError;
use crate::routename::RouteNameError;
use crate::source::SourceError;

/// A `file:line:column` anchor for a diagnostic.
///
/// `file` names Rust source for binding/configuration errors and the
/// original template source for template type errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: usize, column: usize, offset: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Root error type for analyzer operations.
#[derive(Debug, Error, Clone)]
pub enum MuxtError {
    /// Package loading or AST lookup failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The template environment could not be reconstructed.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// A template name does not parse as a route.
    #[error(transparent)]
    RouteName(#[from] RouteNameError),

    /// A route could not be bound to the receiver.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A template action failed type checking.
    #[error(transparent)]
    Check(#[from] CheckError),

    /// Writing a generated file failed.
    #[error("failed to write {path}: {message}")]
    Emit { path: PathBuf, message: String },
}

impl MuxtError {
    /// Error category, for logging severity and CLI styling. Every category
    /// exits with code 1; the distinction is presentational.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(_) => ErrorCategory::Package,
            Self::Environment(_) => ErrorCategory::Environment,
            Self::RouteName(_) => ErrorCategory::RouteName,
            Self::Resolve(_) => ErrorCategory::Binding,
            Self::Check(_) => ErrorCategory::TemplateType,
            Self::Emit { .. } => ErrorCategory::Io,
        }
    }

    /// User-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Source(SourceError::PackageNotFound { dir }) => vec![
                format!("No Rust sources found under {}", dir.display()),
                "Run from the package directory or pass -C <dir>".into(),
            ],
            Self::Environment(EnvironmentError::VariableNotFound { ident }) => vec![
                format!("Declare `static {ident}: muxt_templates::LazySet = …`"),
                "Or point --find-templates-variable at the right identifier".into(),
            ],
            Self::RouteName(_) => vec![
                "Template names declare routes: [METHOD ][host]/path[ STATUS][ Call(args)]".into(),
                "Example: GET /user/{id} get_user(ctx, id)".into(),
            ],
            Self::Resolve(ResolveError::NoSuchMethod { receiver, method, .. }) => vec![
                format!("Add `fn {method}(…)` to `impl {receiver}`"),
                "Or fix the call name in the template name".into(),
            ],
            Self::Check(_) => vec![
                "The template references something its data type does not have".into(),
                "Run `muxt routes` to see the data type each template receives".into(),
            ],
            _ => Vec::new(),
        }
    }
}

/// Error categories, presentational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Package,
    Environment,
    RouteName,
    Binding,
    TemplateType,
    Io,
}

pub type MuxtResult<T> = Result<T, MuxtError>;

/// An ordered collection of diagnostics from one package pass.
#[derive(Debug, Default, Clone)]
pub struct ErrorList(pub Vec<MuxtError>);

impl ErrorList {
    pub fn push(&mut self, err: impl Into<MuxtError>) {
        self.0.push(err.into());
    }

    pub fn extend<E: Into<MuxtError>>(&mut self, errs: impl IntoIterator<Item = E>) {
        self.0.extend(errs.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Ok when nothing was collected, otherwise self as the error.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_pos_displays_colon_separated() {
        let pos = SourcePos::new("templates/index.html", 3, 7, 41);
        assert_eq!(pos.to_string(), "templates/index.html:3:7");
    }

    #[test]
    fn empty_error_list_is_ok() {
        assert!(ErrorList::default().into_result().is_ok());
    }

    #[test]
    fn error_list_joins_lines() {
        let mut list = ErrorList::default();
        list.push(MuxtError::Emit {
            path: PathBuf::from("a.rs"),
            message: "denied".into(),
        });
        list.push(MuxtError::Emit {
            path: PathBuf::from("b.rs"),
            message: "denied".into(),
        });
        let text = list.to_string();
        assert!(text.contains("a.rs"));
        assert!(text.contains('\n'));
    }
}
