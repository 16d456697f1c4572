// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live collection projector.
//!
//! Keeps a local, ordered, typed list in sync with a remote query. Every
//! remote notification recomputes the visible list as
//! `filter(map(snapshot))` and publishes it whole through a
//! [`tokio::sync::watch`] channel, so readers only ever see complete lists.
//!
//! Failures are published as [`ProjectionState::Failed`], carrying the last
//! good list so a consumer can keep showing it while still seeing the error.

use crate::db::{CollectionQuery, DocumentStore, RemoteDocumentSnapshot, SnapshotEvent, StoreError};
use crate::db::document::ListenRegistration;
use crate::services::filter::ProjectionFilter;
use futures_util::stream::Stream;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

type MapFn<T> = Arc<dyn Fn(&RemoteDocumentSnapshot) -> Option<T> + Send + Sync>;

/// What a subscriber currently sees.
#[derive(Debug)]
pub enum ProjectionState<T> {
    /// No snapshot has arrived yet
    Loading,
    /// Complete, filtered list in remote order
    Ready(Arc<Vec<T>>),
    /// The subscription failed; `last` is the last list that was ready
    Failed { error: StoreError, last: Arc<Vec<T>> },
}

impl<T> Clone for ProjectionState<T> {
    fn clone(&self) -> Self {
        match self {
            ProjectionState::Loading => ProjectionState::Loading,
            ProjectionState::Ready(items) => ProjectionState::Ready(items.clone()),
            ProjectionState::Failed { error, last } => ProjectionState::Failed {
                error: error.clone(),
                last: last.clone(),
            },
        }
    }
}

impl<T> ProjectionState<T> {
    /// Items to display: the ready list, or the last good one on failure.
    pub fn items(&self) -> &[T] {
        match self {
            ProjectionState::Loading => &[],
            ProjectionState::Ready(items) => items.as_slice(),
            ProjectionState::Failed { last, .. } => last.as_slice(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ProjectionState::Ready(_))
    }

    pub fn error(&self) -> Option<&StoreError> {
        match self {
            ProjectionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Synchronous projection core: remote events in, visible state out.
pub struct Projection<T> {
    map: MapFn<T>,
    filter: ProjectionFilter<T>,
    /// Mapped items of the latest snapshot, unfiltered
    mapped: Option<Vec<T>>,
    state: ProjectionState<T>,
}

impl<T: Clone> Projection<T> {
    pub fn new(
        map: impl Fn(&RemoteDocumentSnapshot) -> Option<T> + Send + Sync + 'static,
        filter: ProjectionFilter<T>,
    ) -> Self {
        Self {
            map: Arc::new(map),
            filter,
            mapped: None,
            state: ProjectionState::Loading,
        }
    }

    pub fn state(&self) -> &ProjectionState<T> {
        &self.state
    }

    pub fn filter(&self) -> &ProjectionFilter<T> {
        &self.filter
    }

    /// Fold one remote event into the projection.
    pub fn apply(&mut self, event: SnapshotEvent) -> ProjectionState<T> {
        match event {
            SnapshotEvent::Snapshot(docs) => {
                let mapped: Vec<T> = docs.iter().filter_map(|doc| (self.map)(doc)).collect();
                if mapped.len() < docs.len() {
                    tracing::debug!(
                        dropped = docs.len() - mapped.len(),
                        "Dropped documents that failed to map"
                    );
                }
                self.state = ProjectionState::Ready(Arc::new(self.filter.apply(&mapped)));
                self.mapped = Some(mapped);
            }
            SnapshotEvent::Error(error) => {
                let last = match &self.state {
                    ProjectionState::Loading => Arc::new(Vec::new()),
                    ProjectionState::Ready(items) => items.clone(),
                    ProjectionState::Failed { last, .. } => last.clone(),
                };
                self.state = ProjectionState::Failed { error, last };
            }
        }
        self.state.clone()
    }

    /// Change the filter and recompute from the cached snapshot.
    pub fn update_filter(&mut self, update: impl FnOnce(&mut ProjectionFilter<T>)) -> ProjectionState<T> {
        update(&mut self.filter);
        if let Some(mapped) = &self.mapped {
            let visible = Arc::new(self.filter.apply(mapped));
            self.state = match &self.state {
                ProjectionState::Failed { error, .. } => ProjectionState::Failed {
                    error: error.clone(),
                    last: visible,
                },
                _ => ProjectionState::Ready(visible),
            };
        }
        self.state.clone()
    }
}

struct Shared<T> {
    projection: Projection<T>,
    /// Taken on unsubscribe; nothing publishes once it is gone
    sender: Option<watch::Sender<ProjectionState<T>>>,
}

impl<T: Clone> Shared<T> {
    fn publish(&self, state: ProjectionState<T>) -> bool {
        match &self.sender {
            Some(sender) => {
                sender.send_replace(state);
                true
            }
            None => false,
        }
    }
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> std::sync::MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live subscription. Dropping it unsubscribes.
pub struct SubscriptionHandle<T> {
    receiver: watch::Receiver<ProjectionState<T>>,
    shared: Arc<Mutex<Shared<T>>>,
    registration: ListenRegistration,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> SubscriptionHandle<T> {
    /// Current state, marking it seen.
    pub fn latest(&mut self) -> ProjectionState<T> {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next published state. `None` once unsubscribed.
    pub async fn changed(&mut self) -> Option<ProjectionState<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a state satisfies `pred`, checking the current one first.
    pub async fn wait_for(
        &mut self,
        mut pred: impl FnMut(&ProjectionState<T>) -> bool,
    ) -> Option<ProjectionState<T>> {
        let current = self.latest();
        if pred(&current) {
            return Some(current);
        }
        loop {
            let next = self.changed().await?;
            if pred(&next) {
                return Some(next);
            }
        }
    }

    /// Adjust the client-side filter; the list is republished immediately.
    pub fn update_filter(&self, update: impl FnOnce(&mut ProjectionFilter<T>)) {
        let mut shared = lock(&self.shared);
        if shared.sender.is_none() {
            return;
        }
        let state = shared.projection.update_filter(update);
        shared.publish(state);
    }

    /// States as a stream, starting with the current one.
    pub fn into_stream(self) -> impl Stream<Item = ProjectionState<T>> + Send {
        futures_util::stream::unfold((self, true), |(mut handle, first)| async move {
            let state = if first {
                handle.latest()
            } else {
                handle.changed().await?
            };
            Some((state, (handle, false)))
        })
    }
}

impl<T> SubscriptionHandle<T> {
    pub fn is_active(&self) -> bool {
        lock(&self.shared).sender.is_some()
    }

    /// Stop the subscription. Safe to call repeatedly.
    ///
    /// No state is published after this returns.
    pub fn unsubscribe(&mut self) {
        lock(&self.shared).sender = None;
        self.registration.release();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for SubscriptionHandle<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Creates projected subscriptions against the document store.
#[derive(Clone)]
pub struct LiveProjector {
    store: DocumentStore,
}

impl LiveProjector {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Open a live query and project it.
    ///
    /// Only listener registration is awaited; results arrive on the handle.
    pub async fn subscribe<T>(
        &self,
        query: CollectionQuery,
        map: impl Fn(&RemoteDocumentSnapshot) -> Option<T> + Send + Sync + 'static,
        filter: Option<ProjectionFilter<T>>,
    ) -> Result<SubscriptionHandle<T>, StoreError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let collection = query.collection.clone();
        let feed = self.store.listen(query).await?;
        let mut events = feed.events;

        let (sender, receiver) = watch::channel(ProjectionState::Loading);
        let shared = Arc::new(Mutex::new(Shared {
            projection: Projection::new(map, filter.unwrap_or_default()),
            sender: Some(sender),
        }));

        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let SnapshotEvent::Error(e) = &event {
                    tracing::warn!(collection = %collection, error = %e, "Live query failed");
                }
                let mut shared = lock(&task_shared);
                if shared.sender.is_none() {
                    break;
                }
                let state = shared.projection.apply(event);
                shared.publish(state);
            }
            tracing::debug!(collection = %collection, "Live query ended");
        });

        Ok(SubscriptionHandle {
            receiver,
            shared,
            registration: feed.registration,
            task: Some(task),
        })
    }
}

/// Map function that decodes each document with serde, dropping documents
/// that do not fit `T`.
pub fn decode_as<T: DeserializeOwned>() -> impl Fn(&RemoteDocumentSnapshot) -> Option<T> + Send + Sync + 'static
{
    |doc: &RemoteDocumentSnapshot| match doc.decode::<T>() {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::debug!(doc_id = %doc.id, error = %e, "Skipping malformed document");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn doc(id: &str, fields: Value) -> RemoteDocumentSnapshot {
        let fields: Map<String, Value> = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        RemoteDocumentSnapshot {
            id: id.to_string(),
            version: 1,
            fields,
        }
    }

    fn title_of(doc: &RemoteDocumentSnapshot) -> Option<String> {
        doc.field("title")?.as_str().map(str::to_string)
    }

    #[test]
    fn test_malformed_documents_are_dropped() {
        let mut p = Projection::new(title_of, ProjectionFilter::new());
        let state = p.apply(SnapshotEvent::Snapshot(vec![
            doc("a", json!({"title": "one"})),
            doc("b", json!({"title": 7})),
            doc("c", json!({"title": "three"})),
        ]));
        assert_eq!(state.items(), &["one".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_error_keeps_last_list() {
        let mut p = Projection::new(title_of, ProjectionFilter::new());
        p.apply(SnapshotEvent::Snapshot(vec![doc("a", json!({"title": "one"}))]));

        let state = p.apply(SnapshotEvent::Error(StoreError::PermissionDenied("x".into())));
        assert!(matches!(state.error(), Some(StoreError::PermissionDenied(_))));
        assert_eq!(state.items().len(), 1);

        // Recovery
        let state = p.apply(SnapshotEvent::Snapshot(vec![]));
        assert!(state.is_ready());
        assert!(state.items().is_empty());
    }

    #[test]
    fn test_error_before_first_snapshot_is_not_empty_ready() {
        let mut p = Projection::new(title_of, ProjectionFilter::new());
        let state = p.apply(SnapshotEvent::Error(StoreError::Unavailable("offline".into())));
        assert!(!state.is_ready());
        assert!(state.error().is_some());
    }

    #[test]
    fn test_filter_update_recomputes_cached_snapshot() {
        let filter = ProjectionFilter::new().dimension("initial", |s: &String| s.get(..1).map(str::to_string));
        let mut p = Projection::new(title_of, filter);

        // Nothing cached yet
        let state = p.update_filter(|f| {
            f.select("initial", "t");
        });
        assert!(matches!(state, ProjectionState::Loading));

        let state = p.apply(SnapshotEvent::Snapshot(vec![
            doc("a", json!({"title": "one"})),
            doc("b", json!({"title": "two"})),
            doc("c", json!({"title": "three"})),
        ]));
        assert_eq!(state.items(), &["two".to_string(), "three".to_string()]);

        let state = p.update_filter(|f| f.clear("initial"));
        assert_eq!(state.items().len(), 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_releases_listener() {
        let store = DocumentStore::in_memory();
        let projector = LiveProjector::new(store.clone());
        let mut handle = projector
            .subscribe(CollectionQuery::new("posts"), title_of, None)
            .await
            .unwrap();

        let memory = store.memory().unwrap();
        assert_eq!(memory.listener_count(), 1);
        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(memory.listener_count(), 0);
        assert!(!handle.is_active());
        assert!(handle.changed().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_releases_listener() {
        let store = DocumentStore::in_memory();
        let projector = LiveProjector::new(store.clone());
        let handle = projector
            .subscribe(CollectionQuery::new("posts"), title_of, None)
            .await
            .unwrap();
        drop(handle);
        assert_eq!(store.memory().unwrap().listener_count(), 0);
    }
}
