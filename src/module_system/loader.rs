// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Load-mode dispatch and module body execution.
//!
//! The loader owns the registry, the file resolver, and the parser seam. A
//! resolution/execution chain is one synchronous control flow: nested
//! requires resolve and execute before the dependent proceeds, except for
//! circular references, where the in-progress record's exports are served
//! instead of blocking.

use crate::env::HostEnv;
use crate::error::{ModuleError, Result};
use crate::module_system::interop::{InteropBridge, NamespaceObject};
use crate::module_system::lookup::{ResolutionContext, resolve_lookup_paths};
use crate::module_system::registry::{ModuleRecord, ModuleRegistry};
use crate::module_system::resolver::FileResolver;
use crate::parser::{
    DefaultParser, Expr, ImportBinding, ImportDecl, ModuleAst, ModuleMode, ModuleParser, Stmt,
};
use crate::value::{Binding, Value, binding};
use parking_lot::RwLock;
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Observer invoked when placeholder exports are served to break a cycle.
/// Receives the in-progress module's filename and the requesting module's
/// filename.
pub type CycleObserver = Box<dyn Fn(&Path, Option<&Path>) + Send + Sync>;

/// The loader pipeline.
///
/// Failures propagate synchronously to the immediate caller; retries with an
/// adjusted context (see [`Loader::require_with`]) are caller-driven, never
/// implicit.
pub struct Loader {
    env: HostEnv,
    registry: ModuleRegistry,
    resolver: FileResolver,
    parser: Box<dyn ModuleParser>,
    virtuals: RwLock<HashMap<String, PathBuf>>,
    cycle_observer: RwLock<Option<CycleObserver>>,
    depth: Cell<usize>,
}

impl Loader {
    /// Loader with the bundled declaration parser.
    pub fn new(env: HostEnv) -> Self {
        Self::with_parser(env, Box::new(DefaultParser::new()))
    }

    /// Loader with an explicit parser override.
    pub fn with_parser(env: HostEnv, parser: Box<dyn ModuleParser>) -> Self {
        Self {
            env,
            registry: ModuleRegistry::new(),
            resolver: FileResolver::new(),
            parser,
            virtuals: RwLock::new(HashMap::new()),
            cycle_observer: RwLock::new(None),
            depth: Cell::new(0),
        }
    }

    /// The registry owned by this loader.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// The environment this loader reads from.
    pub fn env(&self) -> &HostEnv {
        &self.env
    }

    /// Install a diagnostic hook for served circular references.
    pub fn set_cycle_observer(&self, observer: CycleObserver) {
        *self.cycle_observer.write() = Some(observer);
    }

    /// Register a host-injected virtual specifier with preloaded exports.
    /// The specifier resolves to a stable synthetic path from then on.
    pub fn register_virtual(&self, name: &str, exports: Value) -> Arc<ModuleRecord> {
        let filename = PathBuf::from(format!("virtual:{name}"));
        let (record, _) = self.registry.resolve_or_create(
            filename.clone(),
            ModuleMode::CommonJs,
            Some(Vec::new()),
            None,
        );
        record.set_exports(exports);
        record.mark_loaded();
        self.virtuals.write().insert(name.to_string(), filename);
        record
    }

    /// CJS-style consumption: resolve, load, and return the exports value.
    /// An ESM dependency yields its default export only.
    pub fn require(
        &self,
        specifier: &str,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> Result<Value> {
        self.require_with(specifier, parent, false)
    }

    /// [`Loader::require`] with an adjusted context: `skip_global_paths`
    /// keeps the resolution away from globally injected roots.
    pub fn require_with(
        &self,
        specifier: &str,
        parent: Option<&Arc<ModuleRecord>>,
        skip_global_paths: bool,
    ) -> Result<Value> {
        if let Some(record) = self.lookup_virtual(specifier) {
            return Ok(record.exports());
        }
        let filename =
            self.resolve_filename(specifier, parent, skip_global_paths, ModuleMode::CommonJs)?;
        let record = self.load_module(filename, parent)?;
        Ok(match record.mode() {
            ModuleMode::Esm => InteropBridge::default_for_cjs(&record),
            ModuleMode::CommonJs => record.exports(),
        })
    }

    /// ESM-style consumption: resolve, load, and return the namespace view.
    pub fn import(
        &self,
        specifier: &str,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> Result<Arc<NamespaceObject>> {
        if let Some(record) = self.lookup_virtual(specifier) {
            return Ok(InteropBridge::namespace_for(&record));
        }
        let filename = self.resolve_filename(specifier, parent, false, ModuleMode::Esm)?;
        let record = self.load_module(filename, parent)?;
        Ok(InteropBridge::namespace_for(&record))
    }

    /// Explicit namespace retrieval for CJS-side consumers that need the
    /// full named set of an ESM dependency.
    pub fn namespace_of(
        &self,
        specifier: &str,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> Result<Arc<NamespaceObject>> {
        self.import(specifier, parent)
    }

    /// Resolve a specifier to its concrete path without loading it.
    pub fn resolve(
        &self,
        specifier: &str,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> Result<PathBuf> {
        if let Some(path) = self.virtuals.read().get(specifier) {
            return Ok(path.clone());
        }
        self.resolve_filename(specifier, parent, false, ModuleMode::CommonJs)
    }

    /// Load a file directly as an entry module (no parent context).
    pub fn load_entry(&self, path: &Path) -> Result<Arc<ModuleRecord>> {
        let filename = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.load_module(filename, None)
    }

    fn lookup_virtual(&self, specifier: &str) -> Option<Arc<ModuleRecord>> {
        let path = self.virtuals.read().get(specifier).cloned()?;
        self.registry.get(&path)
    }

    fn resolve_filename(
        &self,
        specifier: &str,
        parent: Option<&Arc<ModuleRecord>>,
        skip_global_paths: bool,
        mode_hint: ModuleMode,
    ) -> Result<PathBuf> {
        let ctx = ResolutionContext {
            parent: parent.map(|p| p.as_ref()),
            skip_global_paths,
        };
        let dirs = match resolve_lookup_paths(specifier, &ctx, &self.env) {
            Some(dirs) => dirs,
            None => {
                // Unrestricted: default ancestor walk from the requesting
                // directory.
                let from = parent
                    .map(|p| p.directory().to_path_buf())
                    .unwrap_or_else(|| self.env.cwd().to_path_buf());
                self.env.module_paths_for(&from)
            }
        };
        // Relative entries such as "." are anchored at the environment's
        // working directory before probing.
        let dirs: Vec<PathBuf> = dirs
            .into_iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir
                } else {
                    self.env.cwd().join(dir)
                }
            })
            .collect();
        if self.depth.get() == 0 {
            self.resolver.begin_run();
        }
        tracing::trace!(specifier, parent = parent.map(|p| p.id()), "resolving");
        self.resolver
            .resolve(specifier, &dirs, mode_hint, parent.map(|p| p.id()))
    }

    fn load_module(
        &self,
        filename: PathBuf,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> Result<Arc<ModuleRecord>> {
        let filename = filename.canonicalize().unwrap_or(filename);
        let is_json = filename.extension().and_then(|e| e.to_str()) == Some("json");
        let mode = if is_json {
            ModuleMode::CommonJs
        } else {
            self.module_mode_for(&filename)?
        };

        let search_paths = Some(
            self.env
                .module_paths_for(filename.parent().unwrap_or(Path::new("."))),
        );
        let (record, created) =
            self.registry
                .resolve_or_create(filename, mode, search_paths, parent);
        if let Some(parent) = parent {
            parent.add_child(record.clone());
        }

        if !created {
            if !record.loaded() {
                tracing::debug!(
                    filename = record.id(),
                    "serving in-progress exports for circular reference"
                );
                if let Some(observer) = &*self.cycle_observer.read() {
                    observer(record.filename(), parent.map(|p| p.filename()));
                }
            }
            return Ok(record);
        }

        self.depth.set(self.depth.get() + 1);
        let result = if is_json {
            self.execute_json(&record)
        } else {
            self.execute_source(&record, mode)
        };
        self.depth.set(self.depth.get() - 1);

        match result {
            Ok(()) => {
                record.mark_loaded();
                Ok(record)
            }
            Err(err) => {
                // A failed load must not leave a half-executed placeholder
                // serving future requests.
                self.registry.remove(record.filename());
                Err(err)
            }
        }
    }

    /// Mode from the extension, else the nearest enclosing manifest's
    /// declared type. The pipeline never guesses an alternate mode and
    /// retries.
    fn module_mode_for(&self, path: &Path) -> Result<ModuleMode> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mjs") => return Ok(ModuleMode::Esm),
            Some("cjs") => return Ok(ModuleMode::CommonJs),
            _ => {}
        }
        let mut current = path.parent();
        while let Some(dir) = current {
            if let Some(manifest) = self.resolver.read_manifest(dir)? {
                return Ok(match manifest.type_field.as_deref() {
                    Some("module") => ModuleMode::Esm,
                    _ => ModuleMode::CommonJs,
                });
            }
            current = dir.parent();
        }
        Ok(ModuleMode::CommonJs)
    }

    fn execute_json(&self, record: &Arc<ModuleRecord>) -> Result<()> {
        let content = std::fs::read_to_string(record.filename())?;
        let json: serde_json::Value = serde_json::from_str(&content)?;
        record.set_exports(Value::from_json(&json));
        Ok(())
    }

    fn execute_source(&self, record: &Arc<ModuleRecord>, mode: ModuleMode) -> Result<()> {
        let source = std::fs::read_to_string(record.filename())?;
        let ast = self.parser.parse(&source, mode)?;
        match mode {
            ModuleMode::CommonJs => self.execute_cjs(record, &ast),
            ModuleMode::Esm => self.execute_esm(record, &ast),
        }
    }

    fn execute_cjs(&self, record: &Arc<ModuleRecord>, ast: &ModuleAst) -> Result<()> {
        // The `exports` binding keeps pointing at the original object even
        // after `module.exports` is replaced.
        let exports_local = record.exports();
        let mut locals: HashMap<String, Value> = HashMap::new();

        for stmt in &ast.body {
            match stmt {
                Stmt::Require {
                    specifier,
                    binding: bound,
                } => {
                    let value = self.require(specifier, Some(record))?;
                    if let Some(name) = bound {
                        locals.insert(name.clone(), value);
                    }
                }
                Stmt::Local { name, value } => {
                    let value = eval_cjs(value, &locals);
                    locals.insert(name.clone(), value);
                }
                Stmt::Assign { name, value } => {
                    if locals.contains_key(name) {
                        let value = eval_cjs(value, &locals);
                        locals.insert(name.clone(), value);
                    }
                }
                Stmt::ExportsAssign { name, value } => {
                    exports_local.set(name.clone(), eval_cjs(value, &locals));
                }
                Stmt::ModuleExportsAssign { value } => {
                    record.set_exports(eval_cjs(value, &locals));
                }
                // Module-only forms are mode-gated by the parser.
                _ => {}
            }
        }
        Ok(())
    }

    fn execute_esm(&self, record: &Arc<ModuleRecord>, ast: &ModuleAst) -> Result<()> {
        // Static pre-pass: the namespace key set is fixed before any code
        // runs, so a cycling importer already sees every declared name.
        for stmt in &ast.body {
            match stmt {
                Stmt::ExportNamed { name, .. } => {
                    record.insert_binding(name.clone(), binding(Value::Undefined));
                }
                Stmt::ExportDefault { .. } => {
                    record.insert_binding("default", binding(Value::Undefined));
                }
                Stmt::ExportList { names } => {
                    for (local, alias) in names {
                        let exported = alias.clone().unwrap_or_else(|| local.clone());
                        record.insert_binding(exported, binding(Value::Undefined));
                    }
                }
                _ => {}
            }
        }

        // Imports are hoisted: every dependency loads before the body runs.
        let mut locals: HashMap<String, Binding> = HashMap::new();
        for stmt in &ast.body {
            if let Stmt::Import(decl) = stmt {
                self.link_import(record, decl, &mut locals)?;
            }
        }

        for stmt in &ast.body {
            match stmt {
                Stmt::Import(_) => {}
                Stmt::ExportNamed { name, value } => {
                    let value = eval_esm(value, &locals);
                    if let Some(cell) = record.binding(name) {
                        *cell.write() = value;
                        locals.insert(name.clone(), cell);
                    }
                }
                Stmt::ExportDefault { value } => {
                    let value = eval_esm(value, &locals);
                    if let Some(cell) = record.binding("default") {
                        *cell.write() = value;
                    }
                }
                Stmt::ExportList { names } => {
                    for (local, alias) in names {
                        let exported = alias.clone().unwrap_or_else(|| local.clone());
                        if let Some(cell) = locals.get(local) {
                            // Re-link to the local's own cell so the export
                            // stays live under later reassignment.
                            record.insert_binding(exported, cell.clone());
                        }
                    }
                }
                Stmt::Local { name, value } => {
                    let value = eval_esm(value, &locals);
                    locals.insert(name.clone(), binding(value));
                }
                Stmt::Assign { name, value } => {
                    let value = eval_esm(value, &locals);
                    if let Some(cell) = locals.get(name) {
                        *cell.write() = value;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn link_import(
        &self,
        record: &Arc<ModuleRecord>,
        decl: &ImportDecl,
        locals: &mut HashMap<String, Binding>,
    ) -> Result<()> {
        let ns = self.import(&decl.specifier, Some(record))?;
        for bound in &decl.bindings {
            match bound {
                ImportBinding::Default(name) => {
                    if let Some(cell) = ns.binding("default") {
                        locals.insert(name.clone(), cell);
                    }
                }
                ImportBinding::Named(imported, alias) => {
                    let cell = ns.binding(imported).ok_or_else(|| {
                        ModuleError::static_error(
                            format!(
                                "The requested module '{}' does not provide an export named '{}'",
                                decl.specifier, imported
                            ),
                            decl.line,
                            1,
                        )
                    })?;
                    let local = alias.clone().unwrap_or_else(|| imported.clone());
                    locals.insert(local, cell);
                }
                ImportBinding::Namespace(name) => {
                    locals.insert(name.clone(), binding(ns.to_value()));
                }
            }
        }
        Ok(())
    }
}

fn eval_cjs(expr: &Expr, locals: &HashMap<String, Value>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Ident(name) => locals.get(name).cloned().unwrap_or(Value::Undefined),
        Expr::Member(base, key) => locals
            .get(base)
            .and_then(|value| value.get(key))
            .unwrap_or(Value::Undefined),
        Expr::ObjectLiteral => Value::object(),
    }
}

fn eval_esm(expr: &Expr, locals: &HashMap<String, Binding>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Ident(name) => locals
            .get(name)
            .map(|cell| cell.read().clone())
            .unwrap_or(Value::Undefined),
        Expr::Member(base, key) => locals
            .get(base)
            .and_then(|cell| cell.read().get(key))
            .unwrap_or(Value::Undefined),
        Expr::ObjectLiteral => Value::object(),
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

    fn loader_for(tmp: &TempDir) -> Loader {
        Loader::new(HostEnv::with_paths(tmp.path(), vec![], None))
    }

    #[test]
    fn test_require_chain() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.js", "const util = require('./util');\nexports.got = util;\n");
        write(tmp.path(), "util.js", "exports.answer = 42;\n");

        let loader = loader_for(&tmp);
        let record = loader.load_entry(&tmp.path().join("main.js")).unwrap();

        let got = record.exports().get("got").unwrap();
        assert_eq!(got.get("answer"), Some(Value::Number(42.0)));
        assert!(record.loaded());
        assert_eq!(record.children().len(), 1);
    }

    #[test]
    fn test_module_exports_replacement() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "num.js", "module.exports = 7;\nexports.ignored = true;\n");

        let loader = loader_for(&tmp);
        let record = loader.load_entry(&tmp.path().join("num.js")).unwrap();
        // The `exports.ignored` write lands on the original object, which
        // was detached by the `module.exports` assignment.
        assert_eq!(record.exports(), Value::Number(7.0));
    }

    #[test]
    fn test_mode_from_extension_and_manifest() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "pkg/package.json", r#"{"type": "module"}"#);
        write(tmp.path(), "pkg/a.js", "");
        write(tmp.path(), "plain/a.js", "");

        let loader = loader_for(&tmp);
        assert_eq!(
            loader.module_mode_for(&tmp.path().join("pkg/a.js")).unwrap(),
            ModuleMode::Esm
        );
        assert_eq!(
            loader.module_mode_for(&tmp.path().join("plain/a.js")).unwrap(),
            ModuleMode::CommonJs
        );
        assert_eq!(
            loader.module_mode_for(Path::new("/any/x.mjs")).unwrap(),
            ModuleMode::Esm
        );
        assert_eq!(
            loader.module_mode_for(&tmp.path().join("pkg/x.cjs")).unwrap(),
            ModuleMode::CommonJs
        );
    }

    #[test]
    fn test_esm_exports_and_live_bindings() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "counter.mjs",
            "export let count = 1;\ncount = 2;\nexport default 'counter';\n",
        );

        let loader = loader_for(&tmp);
        let ns = loader.import("./counter.mjs", None).unwrap();
        // The later reassignment is observable through the binding.
        assert_eq!(ns.get("count"), Some(Value::Number(2.0)));
        assert_eq!(ns.default_value(), Value::String("counter".into()));
    }

    #[test]
    fn test_import_in_cjs_file_is_static_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "bad.js", "import x from './x';\n");

        let loader = loader_for(&tmp);
        let err = loader.load_entry(&tmp.path().join("bad.js")).unwrap_err();
        assert!(matches!(err, ModuleError::Static { line: 1, .. }));
        // The failed load leaves no placeholder behind.
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn test_json_module() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "data.json", r#"{"version": "1.2.3"}"#);
        write(tmp.path(), "main.js", "const data = require('./data.json');\nexports.v = data;\n");

        let loader = loader_for(&tmp);
        let record = loader.load_entry(&tmp.path().join("main.js")).unwrap();
        let data = record.exports().get("v").unwrap();
        assert_eq!(data.get("version"), Some(Value::String("1.2.3".into())));
    }

    #[test]
    fn test_require_of_esm_yields_default_only() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "dep.mjs", "export const named = 1;\nexport default 'only-me';\n");
        write(tmp.path(), "main.js", "const dep = require('./dep.mjs');\nexports.dep = dep;\n");

        let loader = loader_for(&tmp);
        let record = loader.load_entry(&tmp.path().join("main.js")).unwrap();
        assert_eq!(
            record.exports().get("dep"),
            Some(Value::String("only-me".into()))
        );

        // The named set is reachable only through the explicit entry point.
        let ns = loader.namespace_of("./dep.mjs", Some(&record)).unwrap();
        assert_eq!(ns.get("named"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_import_of_cjs_builds_namespace() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "legacy.js", "exports.a = 1;\nexports.b = 'two';\n");
        write(
            tmp.path(),
            "main.mjs",
            "import legacy, { a } from './legacy.js';\nexport const got = a;\n",
        );

        let loader = loader_for(&tmp);
        let ns = loader.import("./main.mjs", None).unwrap();
        assert_eq!(ns.get("got"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_missing_named_export_is_static_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "dep.mjs", "export const a = 1;\n");
        write(tmp.path(), "main.mjs", "import { missing } from './dep.mjs';\n");

        let loader = loader_for(&tmp);
        let err = loader.import("./main.mjs", None).unwrap_err();
        match err {
            ModuleError::Static { message, line, .. } => {
                assert!(message.contains("does not provide an export named 'missing'"));
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_virtual_specifier() {
        let tmp = TempDir::new().unwrap();
        let loader = loader_for(&tmp);

        let exports = Value::object();
        exports.set("sep", Value::String("/".into()));
        loader.register_virtual("path", exports);

        let got = loader.require("path", None).unwrap();
        assert_eq!(got.get("sep"), Some(Value::String("/".into())));
        assert_eq!(
            loader.resolve("path", None).unwrap(),
            PathBuf::from("virtual:path")
        );
    }

    #[test]
    fn test_repeated_require_returns_cached_exports() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "once.js", "exports.stamp = 'first';\n");

        let loader = loader_for(&tmp);
        let first = loader.require("./once.js", None).unwrap();
        first.set("mutated", Value::Boolean(true));

        let second = loader.require("./once.js", None).unwrap();
        assert!(first.same_object(&second));
        assert_eq!(second.get("mutated"), Some(Value::Boolean(true)));
        assert_eq!(loader.registry().len(), 1);
    }
}
