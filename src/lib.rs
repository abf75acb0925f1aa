// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # shimmer
//!
//! A CommonJS/ESM module resolution and interop engine.
//!
//! Shimmer resolves module specifiers (bare, relative, or package-scoped)
//! to concrete source files, decides whether each file is interpreted under
//! CommonJS or ECMAScript-module semantics, and bridges the two export
//! models so modules written in either style can be consumed from the
//! other:
//!
//! - Lookup-path computation with local-over-global shadowing
//! - File and package probing (`package.json` `main`, `type`, and
//!   conditional `exports` maps)
//! - A loader-owned module registry with circular-reference placeholders
//! - CJS/ESM mode dispatch and live export bindings
//! - Namespace-object and default-export interop views
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shimmer::{HostEnv, Loader};
//!
//! let loader = Loader::new(HostEnv::from_process());
//! let record = loader.load_entry(std::path::Path::new("src/index.js"))?;
//! let exports = record.exports();
//! ```
//!
//! Syntax is a collaborator, not a concern of this crate: the loader feeds
//! source text through the [`parser::ModuleParser`] seam and consumes the
//! module-level AST. The bundled [`parser::DefaultParser`] covers the
//! declaration forms the engine executes; a full front end plugs in via
//! [`Loader::with_parser`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod env;
pub mod error;
pub mod module_system;
pub mod parser;
pub mod value;

// Re-exports
pub use env::HostEnv;
pub use error::{ModuleError, Result};
pub use module_system::{
    InteropBridge, Loader, ModuleRecord, ModuleRegistry, NamespaceObject, ResolutionContext,
    resolve_lookup_paths,
};
pub use parser::{DefaultParser, ModuleMode, ModuleParser};
pub use value::Value;

/// Version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
