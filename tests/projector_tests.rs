// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live collection projector against the in-memory store.

use serde::{Deserialize, Serialize};
use serde_json::json;
use stride_tracker::db::{CollectionQuery, DocumentStore, StoreError};
use stride_tracker::services::{decode_as, LiveProjector, ProjectionFilter, ProjectionState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Workout {
    id: String,
    title: String,
    sport: String,
    created_at: String,
}

async fn seed(store: &DocumentStore, id: &str, sport: &str, created_at: &str) {
    store
        .set(
            "workouts",
            id,
            &json!({ "title": format!("workout {}", id), "sport": sport, "created_at": created_at }),
        )
        .await
        .unwrap();
}

fn ids(state: &ProjectionState<Workout>) -> Vec<&str> {
    state.items().iter().map(|w| w.id.as_str()).collect()
}

fn sport_filter() -> ProjectionFilter<Workout> {
    ProjectionFilter::new().dimension("sport", |w: &Workout| Some(w.sport.clone()))
}

#[tokio::test]
async fn test_remote_removal_publishes_shorter_list_in_order() {
    let store = DocumentStore::in_memory();
    seed(&store, "a", "run", "2024-01-01T00:00:00.000Z").await;
    seed(&store, "b", "run", "2024-01-02T00:00:00.000Z").await;
    seed(&store, "c", "run", "2024-01-03T00:00:00.000Z").await;

    let projector = LiveProjector::new(store.clone());
    let mut handle = projector
        .subscribe(CollectionQuery::new("workouts"), decode_as::<Workout>(), None)
        .await
        .unwrap();

    let state = handle.wait_for(|s| s.is_ready()).await.unwrap();
    assert_eq!(ids(&state), vec!["c", "b", "a"]);

    store.delete("workouts", "b").await.unwrap();
    let state = handle.wait_for(|s| s.items().len() != 3).await.unwrap();
    // One step from 3 to 2, never an intermediate list
    assert_eq!(ids(&state), vec!["c", "a"]);
}

#[tokio::test]
async fn test_filter_keeps_selected_values_only() {
    let store = DocumentStore::in_memory();
    let sports = ["run", "ride", "swim", "run", "hike", "ride"];
    for (i, sport) in sports.iter().enumerate() {
        seed(&store, &format!("w{}", i), sport, &format!("2024-01-0{}T00:00:00.000Z", i + 1)).await;
    }

    let mut filter = sport_filter();
    filter.select("sport", "run");
    filter.select("sport", "swim");

    let projector = LiveProjector::new(store);
    let mut handle = projector
        .subscribe(CollectionQuery::new("workouts"), decode_as::<Workout>(), Some(filter))
        .await
        .unwrap();

    let state = handle.wait_for(|s| s.is_ready()).await.unwrap();
    assert!(state
        .items()
        .iter()
        .all(|w| w.sport == "run" || w.sport == "swim"));
    // Remote order is preserved among survivors
    assert_eq!(ids(&state), vec!["w3", "w2", "w0"]);
}

#[tokio::test]
async fn test_empty_filter_passes_everything() {
    let store = DocumentStore::in_memory();
    seed(&store, "a", "run", "2024-01-01T00:00:00.000Z").await;
    seed(&store, "b", "ride", "2024-01-02T00:00:00.000Z").await;

    let projector = LiveProjector::new(store);
    let mut handle = projector
        .subscribe(
            CollectionQuery::new("workouts"),
            decode_as::<Workout>(),
            Some(sport_filter()),
        )
        .await
        .unwrap();

    let state = handle.wait_for(|s| s.is_ready()).await.unwrap();
    assert_eq!(state.items().len(), 2);
}

#[tokio::test]
async fn test_update_filter_republishes_without_remote_change() {
    let store = DocumentStore::in_memory();
    seed(&store, "a", "run", "2024-01-01T00:00:00.000Z").await;
    seed(&store, "b", "ride", "2024-01-02T00:00:00.000Z").await;

    let projector = LiveProjector::new(store);
    let mut handle = projector
        .subscribe(
            CollectionQuery::new("workouts"),
            decode_as::<Workout>(),
            Some(sport_filter()),
        )
        .await
        .unwrap();
    handle.wait_for(|s| s.is_ready()).await.unwrap();

    handle.update_filter(|f| {
        f.select("sport", "ride");
    });
    let state = handle.wait_for(|s| s.items().len() == 1).await.unwrap();
    assert_eq!(ids(&state), vec!["b"]);

    handle.update_filter(|f| f.clear_all());
    let state = handle.wait_for(|s| s.items().len() == 2).await.unwrap();
    assert_eq!(ids(&state), vec!["b", "a"]);
}

#[tokio::test]
async fn test_malformed_remote_documents_are_skipped() {
    let store = DocumentStore::in_memory();
    seed(&store, "good", "run", "2024-01-01T00:00:00.000Z").await;
    store
        .set("workouts", "bad", &json!({ "title": 42, "created_at": "2024-01-02T00:00:00.000Z" }))
        .await
        .unwrap();

    let projector = LiveProjector::new(store);
    let mut handle = projector
        .subscribe(CollectionQuery::new("workouts"), decode_as::<Workout>(), None)
        .await
        .unwrap();

    let state = handle.wait_for(|s| s.is_ready()).await.unwrap();
    assert_eq!(ids(&state), vec!["good"]);
}

#[tokio::test]
async fn test_listener_error_is_surfaced_with_last_list() {
    let store = DocumentStore::in_memory();
    seed(&store, "a", "run", "2024-01-01T00:00:00.000Z").await;

    let projector = LiveProjector::new(store.clone());
    let mut handle = projector
        .subscribe(CollectionQuery::new("workouts"), decode_as::<Workout>(), None)
        .await
        .unwrap();
    handle.wait_for(|s| s.is_ready()).await.unwrap();

    store
        .memory()
        .unwrap()
        .inject_listen_error("workouts", StoreError::PermissionDenied("rules changed".into()));

    let state = handle.wait_for(|s| s.error().is_some()).await.unwrap();
    assert!(matches!(
        state,
        ProjectionState::Failed {
            error: StoreError::PermissionDenied(_),
            ..
        }
    ));
    assert_eq!(ids(&state), vec!["a"]);

    // The listener recovers on the next remote change
    seed(&store, "b", "run", "2024-01-02T00:00:00.000Z").await;
    let state = handle.wait_for(|s| s.is_ready()).await.unwrap();
    assert_eq!(ids(&state), vec!["b", "a"]);
}

#[tokio::test]
async fn test_no_updates_after_unsubscribe() {
    let store = DocumentStore::in_memory();
    let memory = store.memory().unwrap().clone();
    let projector = LiveProjector::new(store.clone());
    let mut handle = projector
        .subscribe(CollectionQuery::new("workouts"), decode_as::<Workout>(), None)
        .await
        .unwrap();
    handle.wait_for(|s| s.is_ready()).await.unwrap();
    assert_eq!(memory.listener_count(), 1);

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(!handle.is_active());
    assert_eq!(memory.listener_count(), 0);

    seed(&store, "late", "run", "2024-01-05T00:00:00.000Z").await;
    assert!(handle.changed().await.is_none());
    assert!(handle.latest().items().is_empty());
}
