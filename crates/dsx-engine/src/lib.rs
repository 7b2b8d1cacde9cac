//! DSX Engine
//!
//! Compiles DSX templates: HTML-like markup with `{{ }}` placeholders,
//! `ds-` directives and references to reusable modules.
//!
//! # Example
//! ```rust,ignore
//! use dsx_engine::{Compiler, MapResolver};
//!
//! let resolver = MapResolver::new().with("card", "<div>{{ title }}</div>");
//! let html = Compiler::new(resolver).compile_blocking(
//!     r#"<html><body><ds-card title="Hi"></ds-card></body></html>"#,
//!     Default::default(),
//!     Default::default(),
//! )?;
//! ```

mod compiler;
mod config;
pub mod directive;
mod generator;
mod idgen;
pub mod interpolate;
mod module;
mod processor;
mod resolver;

pub use compiler::{Compiler, compile, compile_blocking};
pub use config::{CompileOptions, NonCollectionPolicy};
pub use idgen::{IdGenerator, MODULE_ID_PREFIX};
pub use module::Module;
pub use resolver::{DirResolver, MapResolver, ModuleResolver, ResolveError};

pub use dsx_dom::{BuildError, Layout};
pub use dsx_script::{Bindings, Function, Map, Value};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compilation error
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("malformed template: {0}")]
    Build(#[from] BuildError),

    #[error("module resolution failed: {0}")]
    Resolve(#[from] ResolveError),
}
