// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The resolution and interop engine.
//!
//! ## Resolution
//! - Lookup-path computation per specifier/parent pair
//! - File and package probing (extensions, index files, manifest entry
//!   points, conditional exports)
//!
//! ## Loading
//! - Registry of module records with in-progress placeholders for
//!   circular references
//! - CJS / ESM mode dispatch from file extension and package metadata
//!
//! ## Interop
//! - Namespace objects over CJS exports
//! - Default-export views of ESM modules for CJS consumers

mod interop;
mod loader;
mod lookup;
mod registry;
mod resolver;

pub use interop::{InteropBridge, NamespaceObject};
pub use loader::{CycleObserver, Loader};
pub use lookup::{ResolutionContext, is_relative, resolve_lookup_paths};
pub use registry::{ModuleRecord, ModuleRegistry};
pub use resolver::{EXTENSIONS, FileResolver};
