// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore backend for the document store.
//!
//! Documents are read and written as JSON field maps; live queries use the
//! Firestore listen API and are folded into full, ordered result sets that
//! are published at consistency points only.

use crate::db::document::{
    apply_array_op, CollectionQuery, Direction, FieldFilter, ListenRegistration,
    RemoteDocumentSnapshot, SnapshotEvent, SnapshotFeed, StoreError, WriteOp,
};
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreConsistencySelector, FirestoreListenEvent, FirestoreListenerTarget,
    FirestoreMemListenStateStorage, FirestoreQueryDirection, FirestoreWritePrecondition,
};
use gcloud_sdk::google::firestore::v1::Document;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Firestore limits batch/transaction writes to 500 operations.
/// We use a safe limit of 400 to allow headroom.
pub const MAX_BATCH_OPS: usize = 400;

/// Attempts for a transaction aborted by contention.
const MAX_COMMIT_ATTEMPTS: u32 = 5;
const COMMIT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(50);

/// Each listener carries a single query target.
const LISTEN_TARGET_ID: u32 = 1;

// google.firestore.v1.TargetChange.TargetChangeType
const TARGET_NO_CHANGE: i32 = 0;
const TARGET_CURRENT: i32 = 3;

// google.rpc.Code
const CODE_PERMISSION_DENIED: i32 = 7;
const CODE_UNAUTHENTICATED: i32 = 16;

/// Metadata fields the Firestore deserializer adds to every document.
const FIRESTORE_META_PREFIX: &str = "_firestore_";

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreBackend {
    client: firestore::FirestoreDb,
}

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl FirestoreBackend {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RemoteDocumentSnapshot>, StoreError> {
        let doc: Option<Document> = self
            .client
            .fluent()
            .select()
            .by_id_in(collection)
            .one(id)
            .await
            .map_err(backend_err)?;

        doc.as_ref().map(snapshot_from_document).transpose()
    }

    /// One-shot query.
    pub async fn query(
        &self,
        query: &CollectionQuery,
    ) -> Result<Vec<RemoteDocumentSnapshot>, StoreError> {
        let select = self
            .client
            .fluent()
            .select()
            .from(query.collection.as_str());

        let select = if query.filters.is_empty() {
            select
        } else {
            let filters = query.filters.clone();
            select.filter(move |q| {
                q.for_all(filters.iter().map(|f| match f {
                    FieldFilter::Equal { field, value } => q.field(field.as_str()).eq(value.clone()),
                    FieldFilter::ArrayContains { field, value } => {
                        q.field(field.as_str()).array_contains(value.clone())
                    }
                }))
            })
        };

        let select = select.order_by([(query.order_by.as_str(), direction(query.direction))]);
        let select = match query.limit {
            Some(limit) => select.limit(limit as u32),
            None => select,
        };

        let docs: Vec<Document> = select.query().await.map_err(backend_err)?;

        docs.iter().map(snapshot_from_document).collect()
    }

    // ─── Writes ──────────────────────────────────────────────────

    pub async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(fields)
            .execute()
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    /// Commit a batch inside one Firestore transaction.
    ///
    /// Increments are server-side field transforms. Array ops that keep a
    /// count field read their document inside the transaction, so a
    /// concurrent writer aborts the commit instead of being overwritten;
    /// aborted commits are retried. Every op except set and delete carries
    /// an exists precondition.
    pub async fn commit(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        if ops.len() > MAX_BATCH_OPS {
            return Err(StoreError::Backend(format!(
                "Batch of {} writes exceeds the {} write limit",
                ops.len(),
                MAX_BATCH_OPS
            )));
        }

        let mut attempt = 1;
        loop {
            match self.try_commit(ops).await {
                Err(StoreError::Unavailable(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(attempt, reason = %reason, "Firestore commit aborted, retrying");
                    tokio::time::sleep(COMMIT_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_commit(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to begin transaction: {}", e)))?;

        let reader = self
            .client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ));
        let staged = resolve_array_ops(&reader, ops).await;
        let resolved = match staged {
            Ok(resolved) => resolved,
            Err(e) => {
                if let Err(rollback) = transaction.rollback().await {
                    tracing::warn!(error = %rollback, "Transaction rollback failed");
                }
                return Err(e);
            }
        };
        let exists = || FirestoreWritePrecondition::Exists(true);

        for op in &resolved {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    fields,
                } => {
                    self.client
                        .fluent()
                        .update()
                        .in_col(collection)
                        .document_id(id)
                        .object(fields)
                        .add_to_transaction(&mut transaction)
                        .map_err(backend_err)?;
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    self.client
                        .fluent()
                        .update()
                        .fields(fields.keys())
                        .in_col(collection)
                        .precondition(exists())
                        .document_id(id)
                        .object(fields)
                        .add_to_transaction(&mut transaction)
                        .map_err(backend_err)?;
                }
                WriteOp::Delete { collection, id } => {
                    self.client
                        .fluent()
                        .delete()
                        .from(collection)
                        .document_id(id)
                        .add_to_transaction(&mut transaction)
                        .map_err(backend_err)?;
                }
                WriteOp::Increment {
                    collection,
                    id,
                    field,
                    delta,
                } => {
                    self.client
                        .fluent()
                        .update()
                        .in_col(collection)
                        .precondition(exists())
                        .document_id(id)
                        .transforms(|t| t.fields([t.field(field.as_str()).increment(*delta)]))
                        .only_transform()
                        .add_to_transaction(&mut transaction)
                        .map_err(backend_err)?;
                }
                WriteOp::ArrayUnion {
                    collection,
                    id,
                    field,
                    values,
                    ..
                } => {
                    self.client
                        .fluent()
                        .update()
                        .in_col(collection)
                        .precondition(exists())
                        .document_id(id)
                        .transforms(|t| {
                            t.fields([t
                                .field(field.as_str())
                                .append_missing_elements(values.iter().cloned())])
                        })
                        .only_transform()
                        .add_to_transaction(&mut transaction)
                        .map_err(backend_err)?;
                }
                WriteOp::ArrayRemove {
                    collection,
                    id,
                    field,
                    values,
                    ..
                } => {
                    self.client
                        .fluent()
                        .update()
                        .in_col(collection)
                        .precondition(exists())
                        .document_id(id)
                        .transforms(|t| {
                            t.fields([t
                                .field(field.as_str())
                                .remove_all_from_array(values.iter().cloned())])
                        })
                        .only_transform()
                        .add_to_transaction(&mut transaction)
                        .map_err(backend_err)?;
                }
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| commit_error(e, ops))?;

        tracing::debug!(writes = resolved.len(), "Committed Firestore batch");
        Ok(())
    }

    // ─── Live Queries ────────────────────────────────────────────

    /// Start a Firestore listener for `query`.
    ///
    /// Changes are buffered in a document map and a full, ordered snapshot
    /// is emitted when the target becomes current and at every global
    /// consistency point after that.
    pub async fn listen(&self, query: CollectionQuery) -> Result<SnapshotFeed, StoreError> {
        let mut listener = self
            .client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(backend_err)?;

        let select = self
            .client
            .fluent()
            .select()
            .from(query.collection.as_str());

        let select = if query.filters.is_empty() {
            select
        } else {
            let filters = query.filters.clone();
            select.filter(move |q| {
                q.for_all(filters.iter().map(|f| match f {
                    FieldFilter::Equal { field, value } => q.field(field.as_str()).eq(value.clone()),
                    FieldFilter::ArrayContains { field, value } => {
                        q.field(field.as_str()).array_contains(value.clone())
                    }
                }))
            })
        };

        select
            .order_by([(query.order_by.as_str(), direction(query.direction))])
            .listen()
            .add_target(FirestoreListenerTarget::new(LISTEN_TARGET_ID), &mut listener)
            .map_err(backend_err)?;

        let (sender, events) = mpsc::unbounded_channel();
        let docs: Arc<Mutex<BTreeMap<String, RemoteDocumentSnapshot>>> =
            Arc::new(Mutex::new(BTreeMap::new()));

        let collection = query.collection.clone();
        listener
            .start(move |event| {
                let docs = docs.clone();
                let sender = sender.clone();
                let query = query.clone();
                async move {
                    handle_listen_event(event, &docs, &query, &sender);
                    Ok(())
                }
            })
            .await
            .map_err(backend_err)?;

        tracing::debug!(collection = %collection, "Firestore listener started");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            // Either an explicit release or the registration being dropped.
            let _ = stop_rx.await;
            if let Err(e) = listener.shutdown().await {
                tracing::warn!(error = %e, collection = %collection, "Listener shutdown failed");
            }
        });

        let registration = ListenRegistration::new(move || {
            let _ = stop_tx.send(());
        });

        Ok(SnapshotFeed {
            events,
            registration,
        })
    }
}

fn direction(direction: Direction) -> FirestoreQueryDirection {
    match direction {
        Direction::Ascending => FirestoreQueryDirection::Ascending,
        Direction::Descending => FirestoreQueryDirection::Descending,
    }
}

/// Turn an update/increment into a field update against the cached document.
/// Turn array ops with a count field into plain updates computed from reads
/// through `reader`. Other ops pass through unchanged.
async fn resolve_array_ops(
    reader: &firestore::FirestoreDb,
    ops: &[WriteOp],
) -> Result<Vec<WriteOp>, StoreError> {
    let needs_read = |op: &WriteOp| {
        matches!(
            op,
            WriteOp::ArrayUnion {
                count_field: Some(_),
                ..
            } | WriteOp::ArrayRemove {
                count_field: Some(_),
                ..
            }
        )
    };
    if !ops.iter().any(needs_read) {
        return Ok(ops.to_vec());
    }

    let mut current: BTreeMap<(String, String), Map<String, Value>> = BTreeMap::new();
    let mut resolved = Vec::with_capacity(ops.len());
    for op in ops {
        if !needs_read(op) {
            resolved.push(op.clone());
            continue;
        }
        let key = (op.collection().to_string(), op.id().to_string());
        if !current.contains_key(&key) {
            let doc: Option<Document> = reader
                .fluent()
                .select()
                .by_id_in(op.collection())
                .one(op.id())
                .await
                .map_err(backend_err)?;
            let doc = doc.ok_or_else(|| StoreError::NotFound {
                collection: key.0.clone(),
                id: key.1.clone(),
            })?;
            current.insert(key.clone(), snapshot_from_document(&doc)?.fields);
        }
        let fields = current
            .get_mut(&key)
            .ok_or_else(|| StoreError::Backend("document cache miss".to_string()))?;
        apply_array_op(fields, op)?;

        let mut changes = Map::new();
        if let WriteOp::ArrayUnion {
            field, count_field, ..
        }
        | WriteOp::ArrayRemove {
            field, count_field, ..
        } = op
        {
            for name in std::iter::once(field).chain(count_field.iter()) {
                if let Some(value) = fields.get(name) {
                    changes.insert(name.clone(), value.clone());
                }
            }
        }
        resolved.push(WriteOp::Update {
            collection: key.0,
            id: key.1,
            fields: changes,
        });
    }
    Ok(resolved)
}

/// Map a failed commit. Firestore reports a failed exists precondition as
/// NOT_FOUND without naming the document; the first conditional write in
/// the batch is reported.
fn commit_error(error: FirestoreError, ops: &[WriteOp]) -> StoreError {
    match error {
        FirestoreError::DataNotFoundError(_) => match ops.iter().find(|op| op.requires_existing()) {
            Some(op) => StoreError::NotFound {
                collection: op.collection().to_string(),
                id: op.id().to_string(),
            },
            None => backend_err(error),
        },
        FirestoreError::DatabaseError(ref db_err) if db_err.retry_possible => {
            StoreError::Unavailable(error.to_string())
        }
        other => StoreError::Backend(format!("Transaction commit failed: {}", other)),
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Convert a Firestore document into a backend-neutral snapshot.
fn snapshot_from_document(doc: &Document) -> Result<RemoteDocumentSnapshot, StoreError> {
    let value: Value = firestore::FirestoreDb::deserialize_doc_to(doc)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let mut fields = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    fields.retain(|k, _| !k.starts_with(FIRESTORE_META_PREFIX));

    let version = doc
        .update_time
        .as_ref()
        .map(|t| t.seconds * 1_000_000 + i64::from(t.nanos / 1_000))
        .unwrap_or_default();

    Ok(RemoteDocumentSnapshot {
        id: last_segment(&doc.name).to_string(),
        version,
        fields,
    })
}

fn handle_listen_event(
    event: FirestoreListenEvent,
    docs: &Mutex<BTreeMap<String, RemoteDocumentSnapshot>>,
    query: &CollectionQuery,
    sender: &mpsc::UnboundedSender<SnapshotEvent>,
) {
    let mut docs = docs.lock().unwrap_or_else(PoisonError::into_inner);

    match event {
        FirestoreListenEvent::DocumentChange(change) => {
            let Some(doc) = change.document else {
                return;
            };
            let id = last_segment(&doc.name).to_string();
            if !change.removed_target_ids.is_empty() && change.target_ids.is_empty() {
                docs.remove(&id);
                return;
            }
            match snapshot_from_document(&doc) {
                Ok(snapshot) => {
                    docs.insert(id, snapshot);
                }
                Err(e) => {
                    tracing::debug!(doc = %doc.name, error = %e, "Dropping undecodable document");
                    docs.remove(&id);
                }
            }
        }
        FirestoreListenEvent::DocumentDelete(delete) => {
            docs.remove(last_segment(&delete.document));
        }
        FirestoreListenEvent::DocumentRemove(remove) => {
            docs.remove(last_segment(&remove.document));
        }
        FirestoreListenEvent::TargetChange(change) => {
            if let Some(cause) = change.cause {
                let error = match cause.code {
                    CODE_PERMISSION_DENIED | CODE_UNAUTHENTICATED => {
                        StoreError::PermissionDenied(cause.message)
                    }
                    _ => StoreError::Unavailable(cause.message),
                };
                tracing::warn!(collection = %query.collection, error = %error, "Listener target failed");
                let _ = sender.send(SnapshotEvent::Error(error));
                return;
            }

            let consistent = change.target_change_type == TARGET_CURRENT
                || (change.target_change_type == TARGET_NO_CHANGE && change.target_ids.is_empty());
            if consistent {
                let snapshot = query.order(docs.values().cloned().collect());
                let _ = sender.send(SnapshotEvent::Snapshot(snapshot));
            }
        }
        _ => {}
    }
}
