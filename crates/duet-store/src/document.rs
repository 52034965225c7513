//! Documents and partial updates.
//!
//! A document is a JSON object addressed by `(collection, id)`. Writes are
//! expressed as a [`Patch`]: an ordered list of operations on dot-separated
//! field paths. Two writers touching different paths of the same document
//! never clobber each other; two writers touching the same path resolve by
//! last-writer-wins.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Value at a dot-separated field path.
    pub fn field(&self, path: &str) -> Option<&Value> {
        lookup(&self.data, path)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(StoreError::from)
    }
}

/// One operation of a [`Patch`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replace the value at the path.
    Set(Value),
    /// Remove the key at the path.
    Delete,
    /// Add to the number at the path (missing counts as zero).
    Increment(i64),
    /// Append each element not already present in the array.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each element.
    ArrayRemove(Vec<Value>),
    /// Set to the store's clock, in microseconds since the epoch.
    ServerTimestamp,
}

/// Ordered list of field operations applied to a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `Set` per top-level key of `object`.
    pub fn from_object(object: Value) -> Self {
        let mut patch = Self::new();
        if let Value::Object(map) = object {
            for (key, value) in map {
                patch.ops.push((key, FieldOp::Set(value)));
            }
        }
        patch
    }

    pub fn op(mut self, path: impl Into<String>, op: FieldOp) -> Self {
        self.ops.push((path.into(), op));
        self
    }

    pub fn set(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op(path, FieldOp::Set(value.into()))
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.op(path, FieldOp::Delete)
    }

    pub fn increment(self, path: impl Into<String>, by: i64) -> Self {
        self.op(path, FieldOp::Increment(by))
    }

    pub fn array_union(self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.op(path, FieldOp::ArrayUnion(values))
    }

    pub fn array_remove(self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.op(path, FieldOp::ArrayRemove(values))
    }

    pub fn server_timestamp(self, path: impl Into<String>) -> Self {
        self.op(path, FieldOp::ServerTimestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    /// Apply every operation in order. `now_micros` resolves server
    /// timestamps.
    pub fn apply(&self, doc: &mut Value, now_micros: i64) {
        if !doc.is_object() {
            *doc = Value::Object(Map::new());
        }
        for (path, op) in &self.ops {
            apply_op(doc, path, op, now_micros);
        }
    }
}

/// Value at a dot-separated path inside `value`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn apply_op(doc: &mut Value, path: &str, op: &FieldOp, now_micros: i64) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    if matches!(op, FieldOp::Delete) {
        let mut current = doc;
        for segment in &segments {
            match current.as_object_mut().and_then(|m| m.get_mut(*segment)) {
                Some(next) => current = next,
                None => return,
            }
        }
        if let Some(map) = current.as_object_mut() {
            map.remove(leaf);
        }
        return;
    }

    // Intermediate segments are created (or overwritten) as objects.
    let mut current = doc;
    for segment in &segments {
        let map = ensure_object(current);
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = ensure_object(current);

    match op {
        FieldOp::Set(value) => {
            map.insert(leaf.to_string(), value.clone());
        }
        FieldOp::ServerTimestamp => {
            map.insert(leaf.to_string(), Value::from(now_micros));
        }
        FieldOp::Increment(by) => {
            let next = match map.get(leaf) {
                Some(Value::Number(n)) if n.is_i64() => {
                    Value::from(n.as_i64().unwrap_or_default().saturating_add(*by))
                }
                Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or_default() + *by as f64),
                _ => Value::from(*by),
            };
            map.insert(leaf.to_string(), next);
        }
        FieldOp::ArrayUnion(values) => {
            let entry = map
                .entry(leaf.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(items) = entry {
                for v in values {
                    if !items.contains(v) {
                        items.push(v.clone());
                    }
                }
            }
        }
        FieldOp::ArrayRemove(values) => {
            match map.get_mut(leaf) {
                Some(Value::Array(items)) => items.retain(|item| !values.contains(item)),
                _ => {
                    map.insert(leaf.to_string(), Value::Array(Vec::new()));
                }
            }
        }
        FieldOp::Delete => {}
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}
