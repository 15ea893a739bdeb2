//! `stencil_core` resolves and compiles HTML component templates. Starting
//! from one entry template it loads every imported template and stylesheet,
//! registers the components each template declares, applies the global style
//! transforms and compiles every component body into a tree of output tags,
//! component instantiations, conditionals, loops and bound expressions.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Entry template
//!   → Loader (dedup caches + work-list queue, drained to a fixpoint)
//!   → Discovery (components, imports, stylesheets, test data)
//!   → Style transforms (`@font-face` inlining, component style collection)
//!   → Scope build (namespace per component, binding compilation)
//!   → Program (compiled components + diagnostics)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `stencil.toml`.
//! - [`markup`]: The raw markup tree and the default HTML parser.
//! - [`css`]: The stylesheet AST, the default CSS parser and tree walks.
//! - [`bindings`]: Placeholder splitting and attribute classification.
//!
//! ## Key Types
//!
//! - [`Compiler`]: A compilation session with pluggable reader and parsers.
//! - [`Program`]: The compiled templates, components and stylesheets.
//! - [`TplNode`]: A node of a compiled component body.
//! - [`Diagnostics`]: Errors, warnings and lints collected while compiling.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use stencil_core::compile_project;
//!
//! let program = compile_project(Path::new("."), Path::new("index.html")).unwrap();
//! if program.num_errors() > 0 {
//!     for diagnostic in program.diagnostics().entries() {
//!         eprintln!("{diagnostic}");
//!     }
//! }
//!
//! println!("{}", program.to_json().unwrap());
//! ```

pub use ast::*;
pub use compiler::*;
pub use config::*;
pub use diagnostics::*;
pub use error::*;
pub use loader::*;
pub use scope::Namespace;
pub use scope::Visible;
pub use transforms::*;

mod ast;
pub mod bindings;
mod compiler;
pub mod config;
pub mod css;
mod diagnostics;
pub(crate) mod discovery;
#[allow(unused_assignments)]
mod error;
pub(crate) mod html_tags;
mod loader;
pub mod markup;
mod scope;
mod transforms;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
