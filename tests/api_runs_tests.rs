// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run recording over HTTP: start, fixes, pause/resume, finish and export.

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use stride_tracker::db::StoreError;
use stride_tracker::models::Role;

mod common;
use common::{create_test_app, seed_user, send};

fn fixes(points: &[(f64, f64, i64)]) -> Value {
    let fixes: Vec<Value> = points
        .iter()
        .map(|(lat, lon, t)| json!({ "lat": lat, "lon": lon, "timestamp_millis": t }))
        .collect();
    json!({ "fixes": fixes })
}

#[tokio::test]
async fn test_record_and_save_run() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;

    let (status, body) = send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "running");
    assert_eq!(body["running"], true);

    let (status, body) = send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[
            (1.3521, 103.8198, 0),
            (1.3521, 103.8198, 1000),
            (1.3531, 103.8198, 2000),
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivered"], 3);
    assert_eq!(body["run"]["path"].as_array().unwrap().len(), 2);
    let distance = body["run"]["distance_meters"].as_f64().unwrap();
    assert!((distance - 111.19).abs() < 0.5, "got {}", distance);

    app.clock.advance(Duration::from_secs(60));

    let (status, body) = send(
        &app,
        "POST",
        "/api/runs/finish",
        Some(&token),
        Some(json!({ "title": "  Marina loop " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration_seconds"], 60);
    assert_eq!(body["point_count"], 2);
    let saved = &body["saved"];
    assert_eq!(saved["title"], "Marina loop");
    assert_eq!(saved["user_id"], "runner");
    let run_id = saved["id"].as_str().unwrap().to_string();

    // The session is gone once finished
    let (status, _) = send(&app, "GET", "/api/runs/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, me) = send(&app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["stats"]["total_runs"], 1);
    assert_eq!(me["recording"], false);

    let (status, feature) = send(
        &app,
        "GET",
        &format!("/api/runs/{}/geojson", run_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feature["type"], "Feature");
    assert_eq!(feature["geometry"]["type"], "LineString");
    assert_eq!(
        feature["geometry"]["coordinates"].as_array().unwrap().len(),
        2
    );
    assert_eq!(feature["properties"]["title"], "Marina loop");
}

#[tokio::test]
async fn test_failed_save_keeps_run_for_retry() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;
    send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.0, 0.0, 0), (0.001, 0.0, 1000)])),
    )
    .await;
    app.clock.advance(Duration::from_secs(30));

    app.state
        .store
        .memory()
        .unwrap()
        .inject_commit_error(StoreError::Unavailable("outage".into()));
    let (status, _) = send(&app, "POST", "/api/runs/finish", Some(&token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Still there, finished and waiting to be saved
    let (status, body) = send(&app, "GET", "/api/runs/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "finished");
    assert_eq!(body["path"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/api/runs/finish", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration_seconds"], 30);
    assert_eq!(body["point_count"], 2);
    assert!(body["saved"]["id"].is_string());

    let (status, _) = send(&app, "GET", "/api/runs/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, me) = send(&app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(me["stats"]["total_runs"], 1);
}

#[tokio::test]
async fn test_pause_drops_fixes_and_resume_continues() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;
    send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.0, 0.0, 0), (0.001, 0.0, 1000)])),
    )
    .await;

    let (status, body) = send(&app, "POST", "/api/runs/pause", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "paused");
    let frozen = body["distance_meters"].clone();

    // Fixes delivered while paused are ignored by the recorder
    let (status, body) = send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.002, 0.0, 2000), (0.003, 0.0, 3000)])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run"]["distance_meters"], frozen);
    assert_eq!(body["run"]["path"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "POST", "/api/runs/pause", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/api/runs/resume", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "running");

    let (status, _) = send(&app, "POST", "/api/runs/resume", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.004, 0.0, 4000)])),
    )
    .await;
    assert_eq!(body["run"]["path"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_finish_without_fixes_is_not_saved() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;
    send(&app, "POST", "/api/runs/start", Some(&token), None).await;

    let (status, body) = send(&app, "POST", "/api/runs/finish", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point_count"], 0);
    assert_eq!(body["saved"], Value::Null);
    assert_eq!(body["pace_seconds_per_km"], Value::Null);
}

#[tokio::test]
async fn test_finish_with_save_false() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;
    send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.0, 0.0, 0), (0.001, 0.0, 1000)])),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/runs/finish",
        Some(&token),
        Some(json!({ "save": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["point_count"], 2);
    assert_eq!(body["saved"], Value::Null);

    let (_, me) = send(&app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(me["stats"]["total_runs"], 0);
}

#[tokio::test]
async fn test_discard_run() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;
    send(&app, "POST", "/api/runs/start", Some(&token), None).await;

    let (status, _) = send(&app, "DELETE", "/api/runs/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", "/api/runs/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fixes_without_active_run() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.0, 0.0, 0)])),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_start_twice_keeps_the_run_in_progress() {
    let app = create_test_app();
    let token = seed_user(&app, "runner", Role::Member).await;
    send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&token),
        Some(fixes(&[(0.0, 0.0, 0), (0.001, 0.0, 1000)])),
    )
    .await;

    let (status, body) = send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "running");
    assert_eq!(body["path"].as_array().unwrap().len(), 2);
    assert_eq!(app.state.sessions.len(), 1);

    // Start also resumes a paused run
    send(&app, "POST", "/api/runs/pause", Some(&token), None).await;
    let (_, body) = send(&app, "POST", "/api/runs/start", Some(&token), None).await;
    assert_eq!(body["phase"], "running");
    assert_eq!(body["path"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_runs_are_per_user() {
    let app = create_test_app();
    let ana = seed_user(&app, "ana", Role::Member).await;
    let ben = seed_user(&app, "ben", Role::Member).await;

    send(&app, "POST", "/api/runs/start", Some(&ana), None).await;
    let (status, _) = send(&app, "GET", "/api/runs/current", Some(&ben), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/api/runs/current", Some(&ana), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "running");
}

#[tokio::test]
async fn test_run_path_follows_its_feed_post() {
    let app = create_test_app();
    let runner = seed_user(&app, "runner", Role::Member).await;
    let other = seed_user(&app, "other", Role::Member).await;

    send(&app, "POST", "/api/runs/start", Some(&runner), None).await;
    send(
        &app,
        "POST",
        "/api/runs/fixes",
        Some(&runner),
        Some(fixes(&[(0.0, 0.0, 0), (0.001, 0.0, 1000)])),
    )
    .await;
    let (_, body) = send(&app, "POST", "/api/runs/finish", Some(&runner), None).await;
    let geojson_uri = format!("/api/runs/{}/geojson", body["saved"]["id"].as_str().unwrap());

    // Shared on the feed, so visible to others
    let (status, _) = send(&app, "GET", &geojson_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);

    let posts = app
        .state
        .store
        .query(&stride_tracker::db::CollectionQuery::new("posts"))
        .await
        .unwrap();
    for post in posts {
        app.state.store.delete("posts", &post.id).await.unwrap();
    }

    let (status, _) = send(&app, "GET", &geojson_uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &geojson_uri, Some(&runner), None).await;
    assert_eq!(status, StatusCode::OK);
}
