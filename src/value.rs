// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module-level value representation.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared mutable keyed storage backing an object value.
///
/// Object identity is reference identity (`Arc::ptr_eq`); cloning a
/// [`Value::Object`] yields another handle to the same storage. The
/// circular-require contract depends on this: a dependent that captures an
/// in-progress exports object observes every later write through the same
/// handle.
pub type ObjectRef = Arc<RwLock<BTreeMap<String, Value>>>;

/// A shared mutable cell backing a single module export.
///
/// Named ESM exports are bound through these cells, so a mutation by the
/// exporting module is observed by every importer holding the binding.
pub type Binding = Arc<RwLock<Value>>;

/// Creates a fresh binding cell holding `value`.
pub fn binding(value: Value) -> Binding {
    Arc::new(RwLock::new(value))
}

/// A value produced or consumed by a module body.
#[derive(Debug, Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Object reference (shared, mutable)
    Object(ObjectRef),
}

impl Value {
    /// Creates a fresh empty object value.
    pub fn object() -> Self {
        Value::Object(Arc::new(RwLock::new(BTreeMap::new())))
    }

    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is an object.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Returns true if both values are the same object reference.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Reads an own property, if this value is an object.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.read().get(key).cloned(),
            _ => None,
        }
    }

    /// Writes an own property. Returns false for non-objects.
    pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
        match self {
            Value::Object(map) => {
                map.write().insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// The current own enumerable keys, if this value is an object.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Object(map) => map.read().keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Converts parsed JSON into a value. Arrays become objects with
    /// numeric keys plus a `length` property.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => {
                let value = Value::object();
                for (i, item) in arr.iter().enumerate() {
                    value.set(i.to_string(), Value::from_json(item));
                }
                value.set("length", Value::Number(arr.len() as f64));
                value
            }
            serde_json::Value::Object(obj) => {
                let value = Value::object();
                for (k, v) in obj {
                    value.set(k.clone(), Value::from_json(v));
                }
                value
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                // Handle NaN comparisons
                if a.is_nan() && b.is_nan() {
                    false
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(map) => write!(f, "[object: {} keys]", map.read().len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_identity() {
        let a = Value::object();
        let b = a.clone();
        let c = Value::object();

        assert!(a.same_object(&b));
        assert!(!a.same_object(&c));

        // Writes through one handle are visible through the other.
        a.set("x", Value::Number(1.0));
        assert_eq!(b.get("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_set_on_non_object() {
        let v = Value::Number(3.0);
        assert!(!v.set("x", Value::Null));
        assert_eq!(v.get("x"), None);
    }

    #[test]
    fn test_from_json_array() {
        let json: serde_json::Value = serde_json::from_str(r#"[1, "two", null]"#).unwrap();
        let value = Value::from_json(&json);

        assert_eq!(value.get("0"), Some(Value::Number(1.0)));
        assert_eq!(value.get("1"), Some(Value::String("two".into())));
        assert_eq!(value.get("2"), Some(Value::Null));
        assert_eq!(value.get("length"), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_from_json_nested() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"name": "pkg", "flags": {"deep": true}}"#).unwrap();
        let value = Value::from_json(&json);

        assert_eq!(value.get("name"), Some(Value::String("pkg".into())));
        assert_eq!(
            value.get("flags").and_then(|f| f.get("deep")),
            Some(Value::Boolean(true))
        );
    }
}
