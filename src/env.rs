// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host environment inputs: working directory, global search roots, and the
//! optional host-injected module area.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Conventional subdirectory name marking installed-dependency roots.
pub const MODULES_DIR: &str = "node_modules";

/// Environment collaborator for the resolution engine.
///
/// The engine reads these values as inputs and never mutates them. Global
/// search roots are computed at most once; there is no invalidation path.
/// Tests construct with [`HostEnv::with_paths`] to avoid consulting ambient
/// process state.
#[derive(Debug)]
pub struct HostEnv {
    cwd: PathBuf,
    global_paths: OnceLock<Vec<PathBuf>>,
    extra_module_path: Option<PathBuf>,
}

impl HostEnv {
    /// Environment derived from the hosting process: current directory,
    /// `NODE_PATH`-style roots plus home-derived defaults, no extra module
    /// area. Global roots are computed lazily on first access.
    pub fn from_process() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            global_paths: OnceLock::new(),
            extra_module_path: None,
        }
    }

    /// Fully explicit environment.
    pub fn with_paths(
        cwd: impl Into<PathBuf>,
        global_paths: Vec<PathBuf>,
        extra_module_path: Option<PathBuf>,
    ) -> Self {
        let lock = OnceLock::new();
        let _ = lock.set(global_paths);
        Self {
            cwd: cwd.into(),
            global_paths: lock,
            extra_module_path,
        }
    }

    /// The current working directory used for root invocations.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Process-wide default search roots, memoized on first call.
    pub fn global_paths(&self) -> &[PathBuf] {
        self.global_paths.get_or_init(Self::default_global_paths)
    }

    /// The host-injected extra module area, if the host provides one.
    pub fn extra_module_path(&self) -> Option<&Path> {
        self.extra_module_path.as_deref()
    }

    /// Candidate `node_modules` directories for `from` and each of its
    /// ancestors, nearest first. A directory that is itself a modules root
    /// does not get a nested entry.
    pub fn module_paths_for(&self, from: &Path) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut current = Some(from);
        while let Some(dir) = current {
            let is_modules_dir = dir
                .file_name()
                .map(|name| name == MODULES_DIR)
                .unwrap_or(false);
            if !is_modules_dir {
                paths.push(dir.join(MODULES_DIR));
            }
            current = dir.parent();
        }
        paths
    }

    fn default_global_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(node_path) = std::env::var("NODE_PATH") {
            paths.extend(std::env::split_paths(&node_path).filter(|p| !p.as_os_str().is_empty()));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".node_modules"));
            paths.push(home.join(".node_libraries"));
        }
        paths
    }
}
