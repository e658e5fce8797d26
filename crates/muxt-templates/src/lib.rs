//! # muxt-templates
//!
//! The template engine behind muxt: an action language in the double-brace
//! family (`{{.Field}}`, `{{if}}`, `{{range}}`, `{{template "name" .}}`),
//! parsed into named trees that keep byte positions for diagnostics.
//!
//! The crate serves two masters with one parser:
//!
//! 1. **Runtime** — applications hold a [`TemplateSet`] (usually in a
//!    [`LazySet`] static) and render named templates with [`Value`] data.
//! 2. **Analysis** — the muxt generator re-parses the same sources with the
//!    same parser, so the trees it reasons about are byte-for-byte the trees
//!    the runtime executes.
//!
//! ## Declaring templates
//!
//! ```ignore
//! use muxt_templates as template;
//!
//! static ASSETS: template::Files = template::embed_files!("templates/*.html");
//!
//! static TEMPLATES: template::LazySet = template::lazy(|| {
//!     template::must(
//!         template::new("index.html").parse_files(&ASSETS, &["*.html"]),
//!     )
//! });
//! ```

pub mod error;
pub mod exec;
pub mod files;
pub mod lex;
pub mod node;
pub mod parse;
pub mod set;
pub mod value;

pub use error::{ParseError, RenderError};
pub use files::Files;
pub use node::{Node, Pos, Position, Tree};
pub use set::{IntoTemplateFn, LazySet, TemplateFn, TemplateSet, lazy, must, new};
pub use value::{ErrorValue, Object, Value};

// The embed macro expands to `::muxt_templates::Files::from_static(..)`, so
// it is re-exported here and users never depend on muxt-embed directly.
pub use muxt_embed::embed_files;

/// Default left action delimiter.
pub const LEFT_DELIM: &str = "{{";
/// Default right action delimiter.
pub const RIGHT_DELIM: &str = "}}";

/// Crate version, embedded in generated-code banners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
