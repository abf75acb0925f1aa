// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! File and package probing.
//!
//! Turns an ordered directory list plus a specifier into a concrete file:
//! literal path, recognized extensions, directory index, then package
//! manifest entry points (conditional `exports` map or legacy `main`).

use crate::error::{ModuleError, Result};
use crate::module_system::lookup::is_relative;
use crate::parser::ModuleMode;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Recognized extensions, in probe priority order.
pub const EXTENSIONS: [&str; 4] = [".js", ".mjs", ".cjs", ".json"];

/// Conditions honored when the consumer compiles in module mode.
const ESM_CONDITIONS: [&str; 3] = ["import", "module", "default"];
/// Conditions honored otherwise.
const CJS_CONDITIONS: [&str; 3] = ["require", "node", "default"];

/// Fields of package.json the resolver cares about.
#[derive(Debug, Deserialize)]
pub(crate) struct PackageManifest {
    #[serde(default)]
    pub(crate) main: Option<String>,
    #[serde(default, rename = "type")]
    pub(crate) type_field: Option<String>,
    #[serde(default)]
    pub(crate) exports: Option<serde_json::Value>,
}

/// Probes directory lists for concrete module files.
///
/// Probe results (hit and miss) are cached by candidate path for the
/// duration of one resolution run; the loader clears the cache at the start
/// of each top-level chain.
pub struct FileResolver {
    extensions: Vec<String>,
    probe_cache: RwLock<HashMap<PathBuf, Option<PathBuf>>>,
}

impl FileResolver {
    /// Create a resolver with the default extension set.
    pub fn new() -> Self {
        Self {
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            probe_cache: RwLock::new(HashMap::new()),
        }
    }

    /// The extension list in probe order.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Drop cached probe results. Called at the start of a resolution run.
    pub(crate) fn begin_run(&self) {
        self.probe_cache.write().clear();
    }

    /// Probe `dirs` in order for `specifier`. `mode` selects the condition
    /// set used for conditional `exports` maps.
    pub fn resolve(
        &self,
        specifier: &str,
        dirs: &[PathBuf],
        mode: ModuleMode,
        parent: Option<&str>,
    ) -> Result<PathBuf> {
        let mut searched = Vec::new();

        if Path::new(specifier).is_absolute() {
            let base = PathBuf::from(specifier);
            if let Some(hit) = self.load_as_path(&base, mode)? {
                return Ok(hit);
            }
            searched.push(base);
        } else if is_relative(specifier) {
            for dir in dirs {
                let base = dir.join(specifier);
                if let Some(hit) = self.load_as_path(&base, mode)? {
                    return Ok(hit);
                }
                searched.push(base);
            }
        } else {
            let (name, subpath) = split_package_specifier(specifier);
            for dir in dirs {
                let pkg_dir = dir.join(name);
                if let Some(hit) = self.load_package(&pkg_dir, subpath, mode)? {
                    return Ok(hit);
                }
                searched.push(pkg_dir);
            }
        }

        tracing::debug!(specifier, candidates = searched.len(), "resolution failed");
        Err(ModuleError::not_found(
            specifier,
            parent.map(str::to_string),
            searched,
            self.extensions.clone(),
        ))
    }

    /// Literal path, then extensions, then directory handling.
    fn load_as_path(&self, base: &Path, mode: ModuleMode) -> Result<Option<PathBuf>> {
        if let Some(hit) = self.probe_file(base) {
            return Ok(Some(hit));
        }
        for ext in &self.extensions {
            if let Some(hit) = self.probe_file(&append_extension(base, ext)) {
                return Ok(Some(hit));
            }
        }
        if base.is_dir() {
            return self.load_as_directory(base, mode);
        }
        Ok(None)
    }

    /// Package entry point if a manifest is present, index files otherwise.
    fn load_as_directory(&self, dir: &Path, mode: ModuleMode) -> Result<Option<PathBuf>> {
        match self.read_manifest(dir)? {
            Some(manifest) => {
                // The conditional map takes precedence over legacy "main"
                // whenever present; an unmatched map is a failure with no
                // legacy fallback.
                if let Some(exports) = &manifest.exports {
                    return match self.resolve_exports_target(dir, exports, ".", mode)? {
                        Some(target) => Ok(self.probe_file(&dir.join(target))),
                        None => Ok(None),
                    };
                }
                if let Some(main) = &manifest.main {
                    let base = dir.join(main);
                    if let Some(hit) = self.probe_file(&base) {
                        return Ok(Some(hit));
                    }
                    for ext in &self.extensions {
                        if let Some(hit) = self.probe_file(&append_extension(&base, ext)) {
                            return Ok(Some(hit));
                        }
                    }
                    if base.is_dir() {
                        if let Some(hit) = self.load_index(&base) {
                            return Ok(Some(hit));
                        }
                    }
                }
                Ok(self.load_index(dir))
            }
            None => Ok(self.load_index(dir)),
        }
    }

    fn load_index(&self, dir: &Path) -> Option<PathBuf> {
        for ext in &self.extensions {
            if let Some(hit) = self.probe_file(&dir.join(format!("index{ext}"))) {
                return Some(hit);
            }
        }
        None
    }

    /// Bare-specifier probing rooted at a candidate package directory.
    fn load_package(
        &self,
        pkg_dir: &Path,
        subpath: Option<&str>,
        mode: ModuleMode,
    ) -> Result<Option<PathBuf>> {
        match subpath {
            None => self.load_as_path(pkg_dir, mode),
            Some(sub) => {
                if let Some(manifest) = self.read_manifest(pkg_dir)? {
                    if let Some(exports) = &manifest.exports {
                        let key = format!("./{sub}");
                        return match self.resolve_exports_target(pkg_dir, exports, &key, mode)? {
                            Some(target) => Ok(self.probe_file(&pkg_dir.join(target))),
                            None => Ok(None),
                        };
                    }
                }
                self.load_as_path(&pkg_dir.join(sub), mode)
            }
        }
    }

    /// Resolve an `exports` value to a relative target for `key`.
    ///
    /// Condition evaluation is ordered, first match wins. One map level
    /// mixing `./subpath` keys with condition keys is the ambiguous shape:
    /// two branches could match the same request incompatibly.
    fn resolve_exports_target(
        &self,
        pkg: &Path,
        exports: &serde_json::Value,
        key: &str,
        mode: ModuleMode,
    ) -> Result<Option<String>> {
        match exports {
            serde_json::Value::String(target) => {
                if key != "." {
                    return Ok(None);
                }
                validate_exports_target(pkg, target)?;
                Ok(Some(target.clone()))
            }
            serde_json::Value::Array(fallbacks) => {
                for item in fallbacks {
                    if let Some(target) = self.resolve_exports_target(pkg, item, key, mode)? {
                        return Ok(Some(target));
                    }
                }
                Ok(None)
            }
            serde_json::Value::Object(map) => {
                let has_subpath = map.keys().any(|k| k.starts_with('.'));
                let has_conditions = map.keys().any(|k| !k.starts_with('.'));
                if has_subpath && has_conditions {
                    return Err(ModuleError::AmbiguousExports {
                        package: pkg.to_path_buf(),
                        keys: map.keys().cloned().collect(),
                    });
                }
                if has_subpath {
                    return match map.get(key) {
                        Some(entry) => self.resolve_exports_target(pkg, entry, ".", mode),
                        None => Ok(None),
                    };
                }
                if key != "." {
                    return Ok(None);
                }
                let conditions: &[&str] = match mode {
                    ModuleMode::Esm => &ESM_CONDITIONS,
                    ModuleMode::CommonJs => &CJS_CONDITIONS,
                };
                for cond in conditions {
                    if let Some(entry) = map.get(*cond) {
                        if let Some(target) =
                            self.resolve_exports_target(pkg, entry, ".", mode)?
                        {
                            return Ok(Some(target));
                        }
                    }
                }
                Ok(None)
            }
            serde_json::Value::Null => Ok(None),
            _ => Err(ModuleError::manifest(
                pkg.join("package.json"),
                "unsupported exports value",
            )),
        }
    }

    /// Read and parse `dir/package.json`. Absent manifests are `None`;
    /// present-but-malformed manifests abort resolution for this package
    /// subtree.
    pub(crate) fn read_manifest(&self, dir: &Path) -> Result<Option<PackageManifest>> {
        let path = dir.join("package.json");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| ModuleError::manifest(path, err.to_string()))
    }

    fn probe_file(&self, path: &Path) -> Option<PathBuf> {
        if let Some(cached) = self.probe_cache.read().get(path) {
            return cached.clone();
        }
        let result = path.is_file().then(|| path.to_path_buf());
        self.probe_cache
            .write()
            .insert(path.to_path_buf(), result.clone());
        result
    }
}

impl Default for FileResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(ext);
    PathBuf::from(name)
}

fn validate_exports_target(pkg: &Path, target: &str) -> Result<()> {
    if target.starts_with("./") {
        Ok(())
    } else {
        Err(ModuleError::manifest(
            pkg.join("package.json"),
            format!("exports target '{target}' must start with './'"),
        ))
    }
}

/// Split a bare specifier into package name and optional subpath,
/// honoring `@scope/name` forms.
fn split_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if let Some(rest) = specifier.strip_prefix('@') {
        if let Some(scope_slash) = rest.find('/') {
            let after_scope = &rest[scope_slash + 1..];
            if let Some(sub_slash) = after_scope.find('/') {
                let name_end = 1 + scope_slash + 1 + sub_slash;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else if let Some(slash) = specifier.find('/') {
        (&specifier[..slash], Some(&specifier[slash + 1..]))
    } else {
        (specifier, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn resolve_in(
        resolver: &FileResolver,
        specifier: &str,
        dir: &Path,
        mode: ModuleMode,
    ) -> Result<PathBuf> {
        resolver.resolve(specifier, &[dir.to_path_buf()], mode, None)
    }

    #[test]
    fn test_literal_path_beats_extensions() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "util", "exports.kind = 'bare';");
        write(tmp.path(), "util.js", "exports.kind = 'js';");

        let resolver = FileResolver::new();
        let hit = resolve_in(&resolver, "./util", tmp.path(), ModuleMode::CommonJs).unwrap();
        assert_eq!(hit, tmp.path().join("util"));
    }

    #[test]
    fn test_extension_priority_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "util.json", "{}");
        write(tmp.path(), "util.js", "");

        let resolver = FileResolver::new();
        let hit = resolve_in(&resolver, "./util", tmp.path(), ModuleMode::CommonJs).unwrap();
        assert_eq!(hit, tmp.path().join("util.js"));
    }

    #[test]
    fn test_directory_index() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "lib/index.js", "");

        let resolver = FileResolver::new();
        let hit = resolve_in(&resolver, "./lib", tmp.path(), ModuleMode::CommonJs).unwrap();
        assert_eq!(hit, tmp.path().join("lib/index.js"));
    }

    #[test]
    fn test_package_main_field() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/package.json", r#"{"main": "./lib/entry.js"}"#);
        write(tmp.path(), "pkg/lib/entry.js", "");

        let resolver = FileResolver::new();
        let hit = resolver
            .resolve("pkg", &[tmp.path().to_path_buf()], ModuleMode::CommonJs, None)
            .unwrap();
        assert_eq!(hit, tmp.path().join("pkg/lib/entry.js"));
    }

    #[test]
    fn test_package_main_without_extension() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/package.json", r#"{"main": "entry"}"#);
        write(tmp.path(), "pkg/entry.js", "");

        let resolver = FileResolver::new();
        let hit = resolver
            .resolve("pkg", &[tmp.path().to_path_buf()], ModuleMode::CommonJs, None)
            .unwrap();
        assert_eq!(hit, tmp.path().join("pkg/entry.js"));
    }

    #[test]
    fn test_exports_takes_precedence_over_main() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "pkg/package.json",
            r#"{"main": "./legacy.js", "exports": "./modern.js"}"#,
        );
        write(tmp.path(), "pkg/legacy.js", "");
        write(tmp.path(), "pkg/modern.js", "");

        let resolver = FileResolver::new();
        let hit = resolver
            .resolve("pkg", &[tmp.path().to_path_buf()], ModuleMode::CommonJs, None)
            .unwrap();
        assert_eq!(hit, tmp.path().join("pkg/modern.js"));
    }

    #[test]
    fn test_exports_conditions_per_mode() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "pkg/package.json",
            r#"{"exports": {"import": "./esm.mjs", "require": "./cjs.js"}}"#,
        );
        write(tmp.path(), "pkg/esm.mjs", "");
        write(tmp.path(), "pkg/cjs.js", "");

        let resolver = FileResolver::new();
        let paths = [tmp.path().to_path_buf()];
        let esm = resolver.resolve("pkg", &paths, ModuleMode::Esm, None).unwrap();
        let cjs = resolver.resolve("pkg", &paths, ModuleMode::CommonJs, None).unwrap();
        assert_eq!(esm, tmp.path().join("pkg/esm.mjs"));
        assert_eq!(cjs, tmp.path().join("pkg/cjs.js"));
    }

    #[test]
    fn test_exports_subpath() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "pkg/package.json",
            r#"{"exports": {".": "./index.js", "./feature": {"default": "./lib/feature.js"}}}"#,
        );
        write(tmp.path(), "pkg/index.js", "");
        write(tmp.path(), "pkg/lib/feature.js", "");

        let resolver = FileResolver::new();
        let paths = [tmp.path().to_path_buf()];
        let hit = resolver
            .resolve("pkg/feature", &paths, ModuleMode::CommonJs, None)
            .unwrap();
        assert_eq!(hit, tmp.path().join("pkg/lib/feature.js"));
    }

    #[test]
    fn test_unmatched_exports_has_no_legacy_fallback() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "pkg/package.json",
            r#"{"main": "./legacy.js", "exports": {"./other": "./other.js"}}"#,
        );
        write(tmp.path(), "pkg/legacy.js", "");
        write(tmp.path(), "pkg/index.js", "");

        let resolver = FileResolver::new();
        let err = resolver
            .resolve("pkg", &[tmp.path().to_path_buf()], ModuleMode::CommonJs, None)
            .unwrap_err();
        assert!(matches!(err, ModuleError::NotFound { .. }));
    }

    #[test]
    fn test_mixed_exports_map_is_ambiguous() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "pkg/package.json",
            r#"{"exports": {".": "./index.js", "import": "./esm.mjs"}}"#,
        );
        write(tmp.path(), "pkg/index.js", "");

        let resolver = FileResolver::new();
        let err = resolver
            .resolve("pkg", &[tmp.path().to_path_buf()], ModuleMode::Esm, None)
            .unwrap_err();
        match err {
            ModuleError::AmbiguousExports { keys, .. } => {
                assert!(keys.contains(&".".to_string()));
                assert!(keys.contains(&"import".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_manifest_aborts_subtree() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/package.json", "{not json");
        write(tmp.path(), "pkg/index.js", "");

        let resolver = FileResolver::new();
        let err = resolver
            .resolve("pkg", &[tmp.path().to_path_buf()], ModuleMode::CommonJs, None)
            .unwrap_err();
        assert!(matches!(err, ModuleError::PackageManifest { .. }));

        // Sibling resolutions are unaffected.
        write(tmp.path(), "other/index.js", "");
        assert!(
            resolver
                .resolve("other", &[tmp.path().to_path_buf()], ModuleMode::CommonJs, None)
                .is_ok()
        );
    }

    #[test]
    fn test_first_directory_shadows_later_ones() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "local/pkg/index.js", "");
        write(tmp.path(), "global/pkg/index.js", "");

        let resolver = FileResolver::new();
        let paths = [tmp.path().join("local"), tmp.path().join("global")];
        let hit = resolver
            .resolve("pkg", &paths, ModuleMode::CommonJs, None)
            .unwrap();
        assert_eq!(hit, tmp.path().join("local/pkg/index.js"));
    }

    #[test]
    fn test_not_found_carries_search_record() {
        let tmp = TempDir::new().unwrap();
        let resolver = FileResolver::new();
        let err = resolver
            .resolve(
                "missing",
                &[tmp.path().to_path_buf()],
                ModuleMode::CommonJs,
                Some("/proj/main.js"),
            )
            .unwrap_err();

        match err {
            ModuleError::NotFound {
                specifier,
                parent,
                searched,
                extensions,
            } => {
                assert_eq!(specifier, "missing");
                assert_eq!(parent.as_deref(), Some("/proj/main.js"));
                assert_eq!(searched, vec![tmp.path().join("missing")]);
                assert_eq!(extensions, EXTENSIONS.map(String::from).to_vec());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_probe_results_cached_until_next_run() {
        let tmp = TempDir::new().unwrap();
        let resolver = FileResolver::new();

        assert!(resolve_in(&resolver, "./late", tmp.path(), ModuleMode::CommonJs).is_err());

        // The miss is cached for the remainder of this run.
        write(tmp.path(), "late.js", "");
        assert!(resolve_in(&resolver, "./late", tmp.path(), ModuleMode::CommonJs).is_err());

        resolver.begin_run();
        assert!(resolve_in(&resolver, "./late", tmp.path(), ModuleMode::CommonJs).is_ok());
    }

    #[test]
    fn test_split_package_specifier() {
        assert_eq!(split_package_specifier("lodash"), ("lodash", None));
        assert_eq!(split_package_specifier("lodash/get"), ("lodash", Some("get")));
        assert_eq!(split_package_specifier("@types/node"), ("@types/node", None));
        assert_eq!(
            split_package_specifier("@babel/core/lib/index"),
            ("@babel/core", Some("lib/index"))
        );
    }
}
