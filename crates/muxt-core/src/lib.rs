//! # muxt-core
//!
//! The analyzer and generator behind the `muxt` command: a compiler for a
//! tiny HTTP DSL whose source code is template names.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        source::Package (syn)            │
//! │   files, statics, impls, TypeIndex      │
//! └──────────────────┬──────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │      environment::evaluate              │
//! │  rebuild the TemplateSet the runtime    │
//! │  would hold, without running user code  │
//! └──────────────────┬──────────────────────┘
//!                    ▼
//! ┌──────────────────┴──────────────────────┐
//! │ routename::Route   resolve::bind_routes │
//! │  names → routes → method bindings       │
//! └──────────────────┬──────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │   check::Checker over forest::Forest    │
//! │   every action typed against the        │
//! │   package's types                       │
//! └──────────────────┬──────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │   emit::generate  /  analyze reports    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Everything is a single-shot, single-threaded pass; the only state is what
//! each stage hands to the next.

pub mod analyze;
pub mod check;
pub mod emit;
pub mod environment;
pub mod error;
pub mod forest;
pub mod resolve;
pub mod routename;
pub mod source;

pub mod prelude {
    pub use crate::analyze::{Analysis, AnalysisOptions};
    pub use crate::environment::Environment;
    pub use crate::error::{MuxtError, MuxtResult, SourcePos};
    pub use crate::resolve::ResolvedRoute;
    pub use crate::routename::Route;
    pub use crate::source::Package;
}

/// Version info, stamped into generated files.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default identifier of the templates variable in analyzed packages.
pub const DEFAULT_TEMPLATES_VARIABLE: &str = "TEMPLATES";
