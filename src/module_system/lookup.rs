// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lookup-path computation.
//!
//! Produces the ordered candidate directory list for a specifier/parent
//! pair. Earlier entries always shadow later ones during file probing; this
//! is what makes a local package win over a globally installed one.

use crate::env::HostEnv;
use crate::module_system::registry::ModuleRecord;
use std::path::PathBuf;

/// Immutable inputs for one lookup-path computation.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// The requesting module, if any
    pub parent: Option<&'a ModuleRecord>,
    /// When set, global roots are never appended
    pub skip_global_paths: bool,
}

impl<'a> ResolutionContext<'a> {
    /// Context for an ordinary resolution on behalf of `parent`.
    pub fn new(parent: Option<&'a ModuleRecord>) -> Self {
        Self {
            parent,
            skip_global_paths: false,
        }
    }

    /// Context that keeps resolution away from globally injected roots.
    pub fn isolated(parent: Option<&'a ModuleRecord>) -> Self {
        Self {
            parent,
            skip_global_paths: true,
        }
    }
}

/// Whether a specifier names a same/parent-directory path.
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Compute the ordered candidate directories for `specifier`.
///
/// Returns `None` (the unrestricted sentinel) when the caller should fall
/// back to its own default search strategy.
///
/// For non-relative specifiers the list starts from the parent's own
/// search paths. Global roots are appended only when that starting list was
/// non-empty and the context allows it: a parent with no list, or an
/// intentionally emptied one, must not silently regain global scope.
pub fn resolve_lookup_paths(
    specifier: &str,
    ctx: &ResolutionContext<'_>,
    env: &HostEnv,
) -> Option<Vec<PathBuf>> {
    if !is_relative(specifier) {
        let mut paths = match ctx.parent.and_then(|p| p.search_paths()) {
            Some(parent_paths) if !parent_paths.is_empty() => parent_paths,
            _ => Vec::new(),
        };

        if !paths.is_empty() && !ctx.skip_global_paths {
            paths.extend(env.global_paths().iter().cloned());
        }

        if let Some(extra) = env.extra_module_path() {
            paths.push(extra.to_path_buf());
        }

        return if paths.is_empty() { None } else { Some(paths) };
    }

    if let Some(parent) = ctx.parent {
        return Some(vec![parent.directory().to_path_buf()]);
    }

    // Root invocation: "." first, then the ancestor walk from the current
    // directory.
    let mut paths = vec![PathBuf::from(".")];
    paths.extend(env.module_paths_for(env.cwd()));
    if !ctx.skip_global_paths {
        paths.extend(env.global_paths().iter().cloned());
    }
    Some(paths)
}
