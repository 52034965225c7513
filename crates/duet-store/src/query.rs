//! Query model shared by one-shot reads and live subscriptions.
//!
//! Semantics follow the managed document databases the client was written
//! against: documents missing the order field are excluded, ties on the
//! order field are broken by document id in the same direction, and
//! `start_after` is strict.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{lookup, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field at path equals the value.
    Eq(String, Value),
    /// Array at path contains the value.
    ArrayContains(String, Value),
    /// Document id equals the value.
    IdEq(String),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(path, expected) => doc.field(path) == Some(expected),
            Filter::ArrayContains(path, needle) => doc
                .field(path)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(needle)),
            Filter::IdEq(id) => doc.id == *id,
        }
    }
}

/// Position of a document within an ordered result, used to resume after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    value: Value,
    id: String,
}

impl Cursor {
    pub fn at(value: Value, id: impl Into<String>) -> Self {
        Self {
            value,
            id: id.into(),
        }
    }

    /// Cursor positioned on `doc` for a query ordered by `order_field`.
    pub fn from_document(doc: &Document, order_field: &str) -> Option<Self> {
        let value = doc.field(order_field)?.clone();
        Some(Self::at(value, doc.id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    /// Filter, order, skip and limit a full collection scan.
    pub fn evaluate(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut rows: Vec<Document> = docs
            .into_iter()
            .filter(|doc| self.filters.iter().all(|f| f.matches(doc)))
            .filter(|doc| match &self.order_by {
                Some((field, _)) => doc.field(field).is_some(),
                None => true,
            })
            .collect();

        rows.sort_by(|a, b| self.compare(a, b));

        if let Some(cursor) = &self.start_after {
            rows.retain(|doc| self.compare_to_cursor(doc, cursor) == Ordering::Greater);
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        match &self.order_by {
            Some((field, direction)) => {
                let ord = compare_values(
                    a.field(field).unwrap_or(&Value::Null),
                    b.field(field).unwrap_or(&Value::Null),
                )
                .then_with(|| a.id.cmp(&b.id));
                directed(ord, *direction)
            }
            None => a.id.cmp(&b.id),
        }
    }

    fn compare_to_cursor(&self, doc: &Document, cursor: &Cursor) -> Ordering {
        match &self.order_by {
            Some((field, direction)) => {
                let ord = compare_values(doc.field(field).unwrap_or(&Value::Null), &cursor.value)
                    .then_with(|| doc.id.cmp(&cursor.id));
                directed(ord, *direction)
            }
            None => doc.id.cmp(&cursor.id),
        }
    }
}

/// Ordered result of a query at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub docs: Vec<Document>,
}

impl Snapshot {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn directed(ord: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Ascending => ord,
        Direction::Descending => ord.reverse(),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: first by type, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or_default();
                let y = y.as_f64().unwrap_or_default();
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
