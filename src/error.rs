// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the resolution and interop engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors that can occur while resolving, loading, or bridging modules.
///
/// None of these are retried internally; each propagates to the immediate
/// caller, which may retry with an adjusted context or surface the failure.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Specifier unresolved after exhausting search paths, extensions,
    /// and package entry points
    #[error("Cannot find module '{specifier}'")]
    NotFound {
        /// The specifier that failed to resolve
        specifier: String,
        /// Filename of the requesting module, if any
        parent: Option<String>,
        /// Every candidate base path that was probed
        searched: Vec<PathBuf>,
        /// The extension list in probe order
        extensions: Vec<String>,
    },

    /// Package manifest present but malformed. Aborts resolution for that
    /// package subtree only; sibling resolutions are unaffected.
    #[error("Invalid package manifest at {path}: {reason}")]
    PackageManifest {
        /// Path of the offending manifest
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Grammar disallowed for the selected mode
    #[error("SyntaxError: {message} ({line}:{column})")]
    Static {
        /// The syntax error message
        message: String,
        /// 1-based source line
        line: usize,
        /// 1-based source column
        column: usize,
    },

    /// More than one conditional-exports branch matched incompatibly
    #[error("Ambiguous exports map in {package}")]
    AmbiguousExports {
        /// The package directory whose manifest is ambiguous
        package: PathBuf,
        /// The keys that clashed
        keys: Vec<String>,
    },

    /// File system error
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error in a JSON module body
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModuleError {
    /// Create a not-found error with the full searched record.
    pub fn not_found(
        specifier: impl Into<String>,
        parent: Option<String>,
        searched: Vec<PathBuf>,
        extensions: Vec<String>,
    ) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
            parent,
            searched,
            extensions,
        }
    }

    /// Create a manifest error for the given package.json path.
    pub fn manifest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PackageManifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a static (syntax) error with a source location.
    pub fn static_error(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Static {
            message: message.into(),
            line,
            column,
        }
    }
}
