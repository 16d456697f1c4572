// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend-neutral document types: snapshots, queries, live feeds and
//! batched writes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tokio::sync::mpsc;

/// Errors from the document store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// One remote document as seen by a reader.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocumentSnapshot {
    /// Document ID (last path segment)
    pub id: String,
    /// Remote-assigned version (update time in micros, or a logical counter)
    pub version: i64,
    /// Document fields
    pub fields: Map<String, Value>,
}

impl RemoteDocumentSnapshot {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Decode into a typed model. An `id` field is filled from the document
    /// ID when the stored fields do not carry one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields
            .entry("id")
            .or_insert_with(|| Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Serialize a model into a top-level field map.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Sort direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Predicate evaluated by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    Equal { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldFilter::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldFilter::ArrayContains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            FieldFilter::Equal { field, value } => {
                fields.get(field).is_some_and(|v| values_equal(v, value))
            }
            FieldFilter::ArrayContains { field, value } => match fields.get(field) {
                Some(Value::Array(items)) => items.iter().any(|v| values_equal(v, value)),
                _ => false,
            },
        }
    }
}

/// A live or one-shot query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    pub collection: String,
    pub order_by: String,
    pub direction: Direction,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<usize>,
}

impl CollectionQuery {
    /// Query a collection ordered by `created_at`, newest first.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: "created_at".to_string(),
            direction: Direction::Descending,
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = field.into();
        self.direction = direction;
        self
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document belongs to the result set.
    ///
    /// As in Firestore, documents lacking the order field are excluded.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        fields.contains_key(&self.order_by) && self.filters.iter().all(|f| f.matches(fields))
    }

    /// Order a result set by the query's field and direction, ties broken by
    /// document ID, then apply the limit.
    pub fn order(&self, mut docs: Vec<RemoteDocumentSnapshot>) -> Vec<RemoteDocumentSnapshot> {
        docs.sort_by(|a, b| {
            let ord = compare_values(a.field(&self.order_by), b.field(&self.order_by));
            let ord = match self.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over field values (Firestore-like type ordering).
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            compare_values(Some(a), Some(b)) == Ordering::Equal
        }
        _ => a == b,
    }
}

/// Notification delivered on a live query.
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    /// Complete, ordered result set after a change.
    Snapshot(Vec<RemoteDocumentSnapshot>),
    /// The listener failed; the subscription may still recover.
    Error(StoreError),
}

/// Releases a remote listener. Idempotent; also runs on drop.
pub struct ListenRegistration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenRegistration {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ListenRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ListenRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenRegistration")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Event stream of a live query plus the handle that stops it.
#[derive(Debug)]
pub struct SnapshotFeed {
    pub events: mpsc::UnboundedReceiver<SnapshotEvent>,
    pub registration: ListenRegistration,
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace a whole document
    Set {
        collection: String,
        id: String,
        fields: Map<String, Value>,
    },
    /// Merge top-level fields into an existing document
    Update {
        collection: String,
        id: String,
        fields: Map<String, Value>,
    },
    Delete {
        collection: String,
        id: String,
    },
    /// Add `delta` to a numeric field of an existing document
    Increment {
        collection: String,
        id: String,
        field: String,
        delta: i64,
    },
    /// Add `values` missing from an array field of an existing document,
    /// keeping `count_field` equal to the array length
    ArrayUnion {
        collection: String,
        id: String,
        field: String,
        values: Vec<Value>,
        count_field: Option<String>,
    },
    /// Remove every occurrence of `values` from an array field
    ArrayRemove {
        collection: String,
        id: String,
        field: String,
        values: Vec<Value>,
        count_field: Option<String>,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. }
            | WriteOp::Increment { collection, .. }
            | WriteOp::ArrayUnion { collection, .. }
            | WriteOp::ArrayRemove { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Set { id, .. }
            | WriteOp::Update { id, .. }
            | WriteOp::Delete { id, .. }
            | WriteOp::Increment { id, .. }
            | WriteOp::ArrayUnion { id, .. }
            | WriteOp::ArrayRemove { id, .. } => id,
        }
    }

    /// Whether the op fails when its document does not exist.
    pub fn requires_existing(&self) -> bool {
        !matches!(self, WriteOp::Set { .. } | WriteOp::Delete { .. })
    }
}

/// Apply an array union or removal to `fields`. Returns whether the array changed.
pub fn apply_array_op(fields: &mut Map<String, Value>, op: &WriteOp) -> Result<bool, StoreError> {
    let (field, values, count_field, union) = match op {
        WriteOp::ArrayUnion {
            field,
            values,
            count_field,
            ..
        } => (field, values, count_field, true),
        WriteOp::ArrayRemove {
            field,
            values,
            count_field,
            ..
        } => (field, values, count_field, false),
        _ => return Ok(false),
    };

    let mut array = match fields.remove(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(StoreError::Serialization(format!(
                "field {} is not an array",
                field
            )))
        }
    };

    let before = array.len();
    let mut changed = false;
    if union {
        for value in values {
            if !array.contains(value) {
                array.push(value.clone());
                changed = true;
            }
        }
    } else {
        array.retain(|item| !values.contains(item));
        changed = array.len() != before;
    }

    if let Some(count_field) = count_field {
        fields.insert(count_field.clone(), Value::from(array.len() as i64));
    }
    fields.insert(field.clone(), Value::Array(array));
    Ok(changed)
}

/// Atomic multi-document write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(
        &mut self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<&mut Self, StoreError> {
        self.ops.push(WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: to_fields(value)?,
        });
        Ok(self)
    }

    pub fn update(
        &mut self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> &mut Self {
        self.ops.push(WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn delete(&mut self, collection: &str, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    pub fn increment(&mut self, collection: &str, id: &str, field: &str, delta: i64) -> &mut Self {
        self.ops.push(WriteOp::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            delta,
        });
        self
    }

    /// Add `value` to an array field unless already present.
    pub fn array_union(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
        count_field: Option<&str>,
    ) -> &mut Self {
        self.ops.push(WriteOp::ArrayUnion {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            values: vec![value],
            count_field: count_field.map(str::to_string),
        });
        self
    }

    pub fn array_remove(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
        count_field: Option<&str>,
    ) -> &mut Self {
        self.ops.push(WriteOp::ArrayRemove {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            values: vec![value],
            count_field: count_field.map(str::to_string),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> RemoteDocumentSnapshot {
        RemoteDocumentSnapshot {
            id: id.to_string(),
            version: 1,
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_order_descending_with_id_tiebreak() {
        let query = CollectionQuery::new("posts");
        let docs = vec![
            doc("b", json!({"created_at": "2024-01-01T00:00:00Z"})),
            doc("c", json!({"created_at": "2024-03-01T00:00:00Z"})),
            doc("a", json!({"created_at": "2024-01-01T00:00:00Z"})),
        ];

        let ids: Vec<String> = query.order(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_numbers_compare_across_int_and_float() {
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10.5))),
            Ordering::Less
        );
        assert!(FieldFilter::eq("n", 3).matches(json!({"n": 3.0}).as_object().unwrap()));
    }

    #[test]
    fn test_missing_order_field_excluded() {
        let query = CollectionQuery::new("posts").filter(FieldFilter::eq("kind", "run"));
        assert!(query.matches(
            json!({"kind": "run", "created_at": "x"})
                .as_object()
                .unwrap()
        ));
        assert!(!query.matches(json!({"kind": "run"}).as_object().unwrap()));
        assert!(!query.matches(json!({"kind": "text", "created_at": "x"}).as_object().unwrap()));
    }

    #[test]
    fn test_array_contains() {
        let filter = FieldFilter::array_contains("members", "u1");
        assert!(filter.matches(json!({"members": ["u0", "u1"]}).as_object().unwrap()));
        assert!(!filter.matches(json!({"members": "u1"}).as_object().unwrap()));
    }

    #[test]
    fn test_decode_fills_id() {
        #[derive(serde::Deserialize)]
        struct Item {
            id: String,
            name: String,
        }

        let item: Item = doc("doc-7", json!({"name": "Loop"})).decode().unwrap();
        assert_eq!(item.id, "doc-7");
        assert_eq!(item.name, "Loop");
    }

    #[test]
    fn test_registration_releases_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registration = ListenRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registration.release();
        registration.release();
        drop(registration);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_array_ops_track_count() {
        let mut fields = json!({"members": ["u0"], "member_count": 1})
            .as_object()
            .unwrap()
            .clone();
        let join = |user: &str| WriteOp::ArrayUnion {
            collection: "groups".into(),
            id: "g".into(),
            field: "members".into(),
            values: vec![json!(user)],
            count_field: Some("member_count".into()),
        };

        assert!(apply_array_op(&mut fields, &join("u1")).unwrap());
        assert!(!apply_array_op(&mut fields, &join("u1")).unwrap());
        assert_eq!(fields["members"], json!(["u0", "u1"]));
        assert_eq!(fields["member_count"], 2);

        let leave = WriteOp::ArrayRemove {
            collection: "groups".into(),
            id: "g".into(),
            field: "members".into(),
            values: vec![json!("u0")],
            count_field: Some("member_count".into()),
        };
        assert!(apply_array_op(&mut fields, &leave).unwrap());
        assert!(!apply_array_op(&mut fields, &leave).unwrap());
        assert_eq!(fields["members"], json!(["u1"]));
        assert_eq!(fields["member_count"], 1);
    }

    #[test]
    fn test_array_op_rejects_non_array_field() {
        let mut fields = json!({"members": "u0"}).as_object().unwrap().clone();
        let op = WriteOp::ArrayUnion {
            collection: "groups".into(),
            id: "g".into(),
            field: "members".into(),
            values: vec![json!("u1")],
            count_field: None,
        };
        assert!(matches!(
            apply_array_op(&mut fields, &op),
            Err(StoreError::Serialization(_))
        ));
    }
}
