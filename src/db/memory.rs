// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory document store with live query notifications.
//!
//! Used for offline mode and tests. Every committed write (single operation
//! or batch) produces exactly one notification per affected live query, so a
//! batch is observed atomically.

use crate::db::document::{
    apply_array_op, CollectionQuery, ListenRegistration, RemoteDocumentSnapshot, SnapshotEvent, SnapshotFeed,
    StoreError, WriteOp,
};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

type Collections = HashMap<String, BTreeMap<String, StoredDoc>>;

#[derive(Debug, Clone)]
struct StoredDoc {
    version: i64,
    fields: Map<String, Value>,
}

struct Listener {
    query: CollectionQuery,
    sender: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<Collections>,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    version: AtomicU64,
    commit_error: Mutex<Option<StoreError>>,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_version(&self) -> i64 {
        self.inner.version.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }

    pub fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RemoteDocumentSnapshot>, StoreError> {
        let collections = self.lock();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| snapshot(id, doc)))
    }

    pub fn query(&self, query: &CollectionQuery) -> Result<Vec<RemoteDocumentSnapshot>, StoreError> {
        let collections = self.lock();
        Ok(evaluate(&collections, query))
    }

    /// Apply a batch atomically: either every op applies or none does.
    pub fn commit(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        let mut collections = self.lock();

        let injected = self
            .inner
            .commit_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(error) = injected {
            return Err(error);
        }

        // Stage on a copy of the touched collections so a failing op leaves
        // the store untouched.
        let touched: HashSet<String> = ops.iter().map(|op| op.collection().to_string()).collect();
        let mut staged: Collections = touched
            .iter()
            .map(|name| (name.clone(), collections.get(name).cloned().unwrap_or_default()))
            .collect();

        for op in ops {
            self.apply_op(&mut staged, op)?;
        }

        for (name, docs) in staged {
            collections.insert(name, docs);
        }

        // Notify while still holding the lock so listeners see commits in order.
        self.notify(&collections, &touched);
        Ok(())
    }

    fn apply_op(&self, staged: &mut Collections, op: &WriteOp) -> Result<(), StoreError> {
        let version = self.next_version();
        match op {
            WriteOp::Set {
                collection,
                id,
                fields,
            } => {
                staged.entry(collection.clone()).or_default().insert(
                    id.clone(),
                    StoredDoc {
                        version,
                        fields: fields.clone(),
                    },
                );
            }
            WriteOp::Update {
                collection,
                id,
                fields,
            } => {
                let doc = existing(staged, collection, id)?;
                for (key, value) in fields {
                    doc.fields.insert(key.clone(), value.clone());
                }
                doc.version = version;
            }
            WriteOp::Delete { collection, id } => {
                if let Some(docs) = staged.get_mut(collection) {
                    docs.remove(id);
                }
            }
            WriteOp::Increment {
                collection,
                id,
                field,
                delta,
            } => {
                let doc = existing(staged, collection, id)?;
                let current = match doc.fields.get(field) {
                    None | Some(Value::Null) => 0,
                    Some(value) => value.as_i64().ok_or_else(|| {
                        StoreError::Serialization(format!("field {} is not an integer", field))
                    })?,
                };
                doc.fields
                    .insert(field.clone(), Value::from(current + delta));
                doc.version = version;
            }
            WriteOp::ArrayUnion { collection, id, .. }
            | WriteOp::ArrayRemove { collection, id, .. } => {
                let doc = existing(staged, collection, id)?;
                apply_array_op(&mut doc.fields, op)?;
                doc.version = version;
            }
        }
        Ok(())
    }

    /// Start a live query. The current result set is delivered immediately.
    pub fn listen(&self, query: CollectionQuery) -> SnapshotFeed {
        let (sender, events) = mpsc::unbounded_channel();
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);

        {
            let collections = self.lock();
            let _ = sender.send(SnapshotEvent::Snapshot(evaluate(&collections, &query)));
            self.inner.listeners.insert(id, Listener { query, sender });
        }

        let inner = self.inner.clone();
        let registration = ListenRegistration::new(move || {
            inner.listeners.remove(&id);
        });

        SnapshotFeed {
            events,
            registration,
        }
    }

    /// Number of live listeners (released listeners are removed).
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Deliver an error to every listener on `collection`, as a backend
    /// would on a permission change or dropped connection.
    pub fn inject_listen_error(&self, collection: &str, error: StoreError) {
        let _collections = self.lock();
        for listener in self.inner.listeners.iter() {
            if listener.query.collection == collection {
                let _ = listener.sender.send(SnapshotEvent::Error(error.clone()));
            }
        }
    }

    /// Fail the next commit with `error`, as a backend would on an outage.
    pub fn inject_commit_error(&self, error: StoreError) {
        *self
            .inner
            .commit_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    fn notify(&self, collections: &Collections, touched: &HashSet<String>) {
        for listener in self.inner.listeners.iter() {
            if touched.contains(&listener.query.collection) {
                let docs = evaluate(collections, &listener.query);
                if listener.sender.send(SnapshotEvent::Snapshot(docs)).is_err() {
                    tracing::debug!(listener = *listener.key(), "Live query receiver gone");
                }
            }
        }
    }
}

fn existing<'a>(
    staged: &'a mut Collections,
    collection: &str,
    id: &str,
) -> Result<&'a mut StoredDoc, StoreError> {
    staged
        .get_mut(collection)
        .and_then(|docs| docs.get_mut(id))
        .ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
}

fn snapshot(id: &str, doc: &StoredDoc) -> RemoteDocumentSnapshot {
    RemoteDocumentSnapshot {
        id: id.to_string(),
        version: doc.version,
        fields: doc.fields.clone(),
    }
}

fn evaluate(collections: &Collections, query: &CollectionQuery) -> Vec<RemoteDocumentSnapshot> {
    let docs = collections
        .get(&query.collection)
        .map(|docs| {
            docs.iter()
                .filter(|(_, doc)| query.matches(&doc.fields))
                .map(|(id, doc)| snapshot(id, doc))
                .collect()
        })
        .unwrap_or_default();
    query.order(docs)
}
