//! Error types shared by the parser and the renderer.

use thiserror::Error;

/// A template could not be parsed.
///
/// Positions are 1-based lines and columns into the source handed to
/// [`crate::TemplateSet::parse`]; `name` is the parse name (a file path when
/// the source came from [`crate::Files`]).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("template: {name}:{line}:{column}: {message}")]
pub struct ParseError {
    pub name: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(
        name: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            line,
            column,
            message: message.into(),
        }
    }
}

/// A template failed during rendering.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("template {name:?} not defined")]
    NoSuchTemplate { name: String },

    #[error("template {name}: function {function:?} not defined")]
    NoSuchFunction { name: String, function: String },

    #[error("template {name}: {message}")]
    Eval { name: String, message: String },

    #[error("template {name}: error calling {function}: {message}")]
    FunctionCall {
        name: String,
        function: String,
        message: String,
    },
}

impl RenderError {
    pub(crate) fn eval(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Eval {
            name: name.into(),
            message: message.into(),
        }
    }
}
