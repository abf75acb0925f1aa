// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CJS ⇄ ESM export bridging.
//!
//! When a module of one model is consumed from the other, the bridge shapes
//! the value the consumer sees: a namespace object over a CJS exports
//! value, or a bare default export for CJS-style consumption of an ESM
//! module.

use crate::module_system::registry::ModuleRecord;
use crate::parser::ModuleMode;
use crate::value::{Binding, Value, binding};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The module-namespace view: a default binding plus named bindings.
///
/// The key set is immutable after first materialization. Bound values may
/// still change when the cells are live (ESM exports); the named view of a
/// CJS exports object is a one-time snapshot.
pub struct NamespaceObject {
    default: Binding,
    named: BTreeMap<String, Binding>,
}

impl NamespaceObject {
    pub(crate) fn new(default: Binding, named: BTreeMap<String, Binding>) -> Self {
        Self { default, named }
    }

    /// Current value of the default export.
    pub fn default_value(&self) -> Value {
        self.default.read().clone()
    }

    /// Current value of a named export. `"default"` reads the default
    /// binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == "default" {
            return Some(self.default_value());
        }
        self.named.get(name).map(|cell| cell.read().clone())
    }

    /// The underlying cell for a named export.
    pub fn binding(&self, name: &str) -> Option<Binding> {
        if name == "default" {
            return Some(self.default.clone());
        }
        self.named.get(name).cloned()
    }

    /// Whether `name` is in the (fixed) key set.
    pub fn has(&self, name: &str) -> bool {
        name == "default" || self.named.contains_key(name)
    }

    /// The named keys, sorted.
    pub fn names(&self) -> Vec<String> {
        self.named.keys().cloned().collect()
    }

    /// Materialize the namespace as a plain object value. Snapshot of the
    /// current bound values; used for `import * as ns` bindings.
    pub fn to_value(&self) -> Value {
        let obj = Value::object();
        obj.set("default", self.default_value());
        for (name, cell) in &self.named {
            obj.set(name.clone(), cell.read().clone());
        }
        obj
    }
}

impl std::fmt::Debug for NamespaceObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceObject")
            .field("names", &self.names())
            .finish()
    }
}

/// Builds the cross-model views.
pub struct InteropBridge;

impl InteropBridge {
    /// The ESM-facing namespace for any record, memoized on the record so
    /// the key set never changes after first access.
    ///
    /// For an ESM record the named bindings are the module's live export
    /// cells. For a CJS record the default binding holds the exports value,
    /// and — when that value is a plain keyed object — its current own
    /// enumerable keys are exposed as named bindings, snapshotted once.
    pub fn namespace_for(record: &Arc<ModuleRecord>) -> Arc<NamespaceObject> {
        if let Some(ns) = record.namespace() {
            return ns;
        }
        let ns = match record.mode() {
            ModuleMode::Esm => {
                let cells = record.bindings_snapshot();
                let default = cells
                    .get("default")
                    .cloned()
                    .unwrap_or_else(|| binding(Value::Undefined));
                let named = cells.into_iter().filter(|(name, _)| name != "default").collect();
                NamespaceObject::new(default, named)
            }
            ModuleMode::CommonJs => {
                let exports = record.exports();
                let mut named = BTreeMap::new();
                if exports.is_object() {
                    for key in exports.keys() {
                        if let Some(value) = exports.get(&key) {
                            named.insert(key, binding(value));
                        }
                    }
                }
                NamespaceObject::new(binding(exports), named)
            }
        };
        record.memoize_namespace(Arc::new(ns))
    }

    /// CJS-style consumption of an ESM record: the default export only.
    /// The full named set requires the explicit namespace entry point.
    pub fn default_for_cjs(record: &ModuleRecord) -> Value {
        record
            .binding("default")
            .map(|cell| cell.read().clone())
            .unwrap_or(Value::Undefined)
    }
}
