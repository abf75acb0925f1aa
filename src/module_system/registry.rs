// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records and the registry that owns them.

use crate::module_system::interop::NamespaceObject;
use crate::parser::ModuleMode;
use crate::value::{Binding, Value};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One resolved module.
///
/// Records are owned exclusively by the [`ModuleRegistry`]. `parent` is a
/// non-owning back-reference used only for path derivation, never for
/// lifecycle. A record starts as a placeholder with an empty exports object
/// and becomes read-mostly once `loaded` flips true at body-execution
/// completion.
pub struct ModuleRecord {
    id: String,
    filename: PathBuf,
    directory: PathBuf,
    mode: ModuleMode,
    search_paths: RwLock<Option<Vec<PathBuf>>>,
    parent: RwLock<Weak<ModuleRecord>>,
    children: RwLock<Vec<Arc<ModuleRecord>>>,
    exports: RwLock<Value>,
    bindings: RwLock<BTreeMap<String, Binding>>,
    namespace: RwLock<Option<Arc<NamespaceObject>>>,
    loaded: AtomicBool,
}

impl ModuleRecord {
    fn new(
        filename: PathBuf,
        mode: ModuleMode,
        search_paths: Option<Vec<PathBuf>>,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> Arc<Self> {
        let directory = filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Arc::new(Self {
            id: filename.display().to_string(),
            filename,
            directory,
            mode,
            search_paths: RwLock::new(search_paths),
            parent: RwLock::new(parent.map(Arc::downgrade).unwrap_or_default()),
            children: RwLock::new(Vec::new()),
            exports: RwLock::new(Value::object()),
            bindings: RwLock::new(BTreeMap::new()),
            namespace: RwLock::new(None),
            loaded: AtomicBool::new(false),
        })
    }

    /// Stable identifier (the filename rendered as a string).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute path of the module file.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Directory containing the module file.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The interpretation mode this record was loaded under.
    pub fn mode(&self) -> ModuleMode {
        self.mode
    }

    /// Whether body execution has completed.
    pub fn loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    /// The module's current exports value. For an object exports this is a
    /// handle to the live storage, not a copy.
    pub fn exports(&self) -> Value {
        self.exports.read().clone()
    }

    pub(crate) fn set_exports(&self, value: Value) {
        *self.exports.write() = value;
    }

    /// The search-path list used when this module resolves non-relative
    /// specifiers. `None` means unrestricted (default ancestor walk).
    pub fn search_paths(&self) -> Option<Vec<PathBuf>> {
        self.search_paths.read().clone()
    }

    /// Replace the search-path list. Narrowing a module's paths scopes every
    /// later non-relative resolution made on its behalf; the lookup layer
    /// never widens a narrowed list back to global scope.
    pub fn set_search_paths(&self, paths: Option<Vec<PathBuf>>) {
        *self.search_paths.write() = paths;
    }

    /// The module that first required this one, if it is still alive.
    pub fn parent(&self) -> Option<Arc<ModuleRecord>> {
        self.parent.read().upgrade()
    }

    /// Modules this record required, in first-require order.
    pub fn children(&self) -> Vec<Arc<ModuleRecord>> {
        self.children.read().clone()
    }

    pub(crate) fn add_child(&self, child: Arc<ModuleRecord>) {
        let mut children = self.children.write();
        if !children.iter().any(|c| c.filename == child.filename) {
            children.push(child);
        }
    }

    /// Live export cell for `name`, if declared.
    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.bindings.read().get(name).cloned()
    }

    pub(crate) fn insert_binding(&self, name: impl Into<String>, cell: Binding) {
        self.bindings.write().insert(name.into(), cell);
    }

    pub(crate) fn bindings_snapshot(&self) -> BTreeMap<String, Binding> {
        self.bindings.read().clone()
    }

    pub(crate) fn namespace(&self) -> Option<Arc<NamespaceObject>> {
        self.namespace.read().clone()
    }

    /// Store the interop namespace on first materialization; later calls
    /// return the already-stored view so the key set never changes.
    pub(crate) fn memoize_namespace(&self, ns: Arc<NamespaceObject>) -> Arc<NamespaceObject> {
        let mut slot = self.namespace.write();
        match &*slot {
            Some(existing) => existing.clone(),
            None => {
                *slot = Some(ns.clone());
                ns
            }
        }
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("filename", &self.filename)
            .field("mode", &self.mode)
            .field("loaded", &self.loaded())
            .finish()
    }
}

/// Cache of resolved modules, keyed by absolute filename.
///
/// Owned by a loader instance, never a hidden process global. Insertion is
/// atomic per filename, so the registry never holds two records for one
/// path. Eviction (`remove`/`clear`) is an external operation; the
/// resolution algorithm itself never evicts.
pub struct ModuleRegistry {
    records: DashMap<PathBuf, Arc<ModuleRecord>>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Look up a record by filename.
    pub fn get(&self, filename: &Path) -> Option<Arc<ModuleRecord>> {
        self.records.get(filename).map(|entry| entry.value().clone())
    }

    /// Whether a record exists for `filename`.
    pub fn contains(&self, filename: &Path) -> bool {
        self.records.contains_key(filename)
    }

    /// Return the existing record for `filename`, or insert a placeholder.
    ///
    /// The boolean is true when a new placeholder was created. An existing
    /// record may still be mid-execution (`loaded() == false`); returning it
    /// as-is is how circular references are served.
    pub fn resolve_or_create(
        &self,
        filename: PathBuf,
        mode: ModuleMode,
        search_paths: Option<Vec<PathBuf>>,
        parent: Option<&Arc<ModuleRecord>>,
    ) -> (Arc<ModuleRecord>, bool) {
        let key = filename.clone();
        match self.records.entry(filename) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let record = ModuleRecord::new(key, mode, search_paths, parent);
                entry.insert(record.clone());
                (record, true)
            }
        }
    }

    /// Remove a record. External eviction hook, not used during resolution.
    pub fn remove(&self, filename: &Path) -> Option<Arc<ModuleRecord>> {
        self.records.remove(filename).map(|(_, record)| record)
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filenames of every record.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
