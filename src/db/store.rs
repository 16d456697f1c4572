// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Document store facade over the Firestore and in-memory backends.
//!
//! Provides collection-based CRUD, atomic batches, counters and live
//! queries with typed helpers on top of JSON field maps.

use crate::db::document::{
    to_fields, CollectionQuery, RemoteDocumentSnapshot, SnapshotFeed, StoreError, WriteBatch,
    WriteOp,
};
use crate::db::firestore::FirestoreBackend;
use crate::db::memory::MemoryStore;
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone)]
enum Backend {
    Firestore(FirestoreBackend),
    Memory(MemoryStore),
}

/// Document store client. Cheap to clone.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Backend,
}

impl DocumentStore {
    /// Connect to Firestore (or the emulator when FIRESTORE_EMULATOR_HOST is set).
    pub async fn firestore(project_id: &str) -> Result<Self, StoreError> {
        Ok(Self {
            backend: Backend::Firestore(FirestoreBackend::new(project_id).await?),
        })
    }

    /// Create an empty in-memory store (offline mode and tests).
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::new()),
        }
    }

    /// The in-memory backend, if this store uses one.
    pub fn memory(&self) -> Option<&MemoryStore> {
        match &self.backend {
            Backend::Memory(store) => Some(store),
            Backend::Firestore(_) => None,
        }
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RemoteDocumentSnapshot>, StoreError> {
        match &self.backend {
            Backend::Firestore(db) => db.get(collection, id).await,
            Backend::Memory(store) => store.get(collection, id),
        }
    }

    /// Get and decode a document.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        self.get(collection, id)
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    /// Get and decode a document that must exist.
    pub async fn require<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<T, StoreError> {
        self.get_as(collection, id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    /// One-shot query returning the ordered result set.
    pub async fn query(
        &self,
        query: &CollectionQuery,
    ) -> Result<Vec<RemoteDocumentSnapshot>, StoreError> {
        match &self.backend {
            Backend::Firestore(db) => db.query(query).await,
            Backend::Memory(store) => store.query(query),
        }
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Add a document under a freshly generated ID.
    pub async fn add<T: Serialize>(&self, collection: &str, value: &T) -> Result<String, StoreError> {
        let id = new_document_id()?;
        self.set(collection, &id, value).await?;
        Ok(id)
    }

    /// Create or replace a document.
    pub async fn set<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let fields = to_fields(value)?;
        match &self.backend {
            Backend::Firestore(db) => db.set(collection, id, &fields).await,
            Backend::Memory(store) => store.commit(&[WriteOp::Set {
                collection: collection.to_string(),
                id: id.to_string(),
                fields,
            }]),
        }
    }

    /// Merge top-level fields into an existing document.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, fields);
        self.commit(batch).await
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Firestore(db) => db.delete(collection, id).await,
            Backend::Memory(store) => store.commit(&[WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            }]),
        }
    }

    /// Add `delta` to a numeric counter field of an existing document.
    pub async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.increment(collection, id, field, delta);
        self.commit(batch).await
    }

    /// Apply every write in the batch atomically.
    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        match &self.backend {
            Backend::Firestore(db) => db.commit(batch.ops()).await,
            Backend::Memory(store) => store.commit(batch.ops()),
        }
    }

    // ─── Live Queries ────────────────────────────────────────────

    /// Start a live query. The feed yields full ordered result sets.
    pub async fn listen(&self, query: CollectionQuery) -> Result<SnapshotFeed, StoreError> {
        match &self.backend {
            Backend::Firestore(db) => db.listen(query).await,
            Backend::Memory(store) => Ok(store.listen(query)),
        }
    }
}

/// Generate a random 128-bit document ID (hex).
pub fn new_document_id() -> Result<String, StoreError> {
    let mut bytes = [0u8; 16];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| StoreError::Backend("random ID generation failed".to_string()))?;
    Ok(hex::encode(bytes))
}
