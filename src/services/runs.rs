// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run persistence.
//!
//! Saving a finished run writes, in one atomic batch:
//! 1. The run record with its encoded path
//! 2. A feed post announcing it
//! 3. The owner's updated stats aggregate

use crate::db::{
    collections, new_document_id, CollectionQuery, DocumentStore, FieldFilter, WriteBatch,
};
use crate::error::{AppError, Result};
use crate::models::{FinishedRun, Post, PostKind, RunRecord, RunningGroup, UserStats};
use crate::time_utils::format_utc_rfc3339;
use chrono::Timelike;
use geojson::{feature::Id, Feature, Geometry, JsonObject};

#[derive(Clone)]
pub struct RunService {
    store: DocumentStore,
}

impl RunService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Persist a finished run and post it to the feed.
    pub async fn save_run(
        &self,
        user_id: &str,
        finished: &FinishedRun,
        title: Option<&str>,
    ) -> Result<RunRecord> {
        let started_at = finished.started_at.unwrap_or(finished.finished_at);
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => default_title(started_at.hour()).to_string(),
        };
        let path_polyline = finished
            .encoded_path()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Polyline encoding failed: {}", e)))?;

        let created_at = format_utc_rfc3339(finished.finished_at);
        let record = RunRecord {
            id: new_document_id()?,
            user_id: user_id.to_string(),
            title,
            started_at: format_utc_rfc3339(started_at),
            created_at: created_at.clone(),
            duration_seconds: finished.duration_seconds,
            distance_meters: finished.distance_meters(),
            pace_seconds_per_km: finished.pace_seconds_per_km(),
            path_polyline,
            point_count: finished.path.len() as u32,
        };

        let post = Post {
            id: new_document_id()?,
            author_id: user_id.to_string(),
            kind: PostKind::Run,
            body: record.title.clone(),
            image_url: None,
            group_id: None,
            run_id: Some(record.id.clone()),
            distance_km: Some(finished.distance_km),
            duration_seconds: Some(finished.duration_seconds),
            comment_count: 0,
            created_at: created_at.clone(),
        };

        let mut stats: UserStats = self
            .store
            .get_as(collections::USER_STATS, user_id)
            .await?
            .unwrap_or_default();
        stats.update_from_run(&record, &created_at);

        let mut batch = WriteBatch::new();
        batch.set(collections::RUNS, &record.id, &record)?;
        batch.set(collections::POSTS, &post.id, &post)?;
        batch.set(collections::USER_STATS, user_id, &stats)?;
        self.store.commit(batch).await?;

        tracing::info!(
            user_id = %user_id,
            run_id = %record.id,
            distance_m = record.distance_meters,
            duration_s = record.duration_seconds,
            "Run saved"
        );
        Ok(record)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        Ok(self.store.require(collections::RUNS, run_id).await?)
    }

    /// A run as seen by `viewer_id`: its owner, or anyone who can see a
    /// feed post sharing it. Hidden runs are reported as missing.
    pub async fn get_visible_run(&self, run_id: &str, viewer_id: &str) -> Result<RunRecord> {
        let run = self.get_run(run_id).await?;
        if run.user_id == viewer_id {
            return Ok(run);
        }

        let shared_in = CollectionQuery::new(collections::POSTS)
            .filter(FieldFilter::eq("run_id", run_id));
        let shares = self.store.query(&shared_in).await?;
        for doc in &shares {
            let Ok(post) = doc.decode::<Post>() else {
                continue;
            };
            let Some(group_id) = post.group_id else {
                return Ok(run);
            };
            let group: Option<RunningGroup> =
                self.store.get_as(collections::GROUPS, &group_id).await?;
            if group.is_some_and(|g| g.members.iter().any(|m| m == viewer_id)) {
                return Ok(run);
            }
        }

        tracing::debug!(run_id = %run_id, viewer_id = %viewer_id, "Run not shared with viewer");
        Err(AppError::NotFound(format!("Run {} not found", run_id)))
    }

    pub async fn stats(&self, user_id: &str) -> Result<UserStats> {
        Ok(self
            .store
            .get_as(collections::USER_STATS, user_id)
            .await?
            .unwrap_or_default())
    }
}

fn default_title(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Morning run",
        12..=16 => "Afternoon run",
        17..=21 => "Evening run",
        _ => "Night run",
    }
}

/// Export a stored run as a GeoJSON LineString feature.
pub fn run_to_geojson(run: &RunRecord) -> Result<Feature> {
    let line = polyline::decode_polyline(&run.path_polyline, 5)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid stored polyline: {}", e)))?;

    let mut properties = JsonObject::new();
    properties.insert("title".to_string(), run.title.clone().into());
    properties.insert("started_at".to_string(), run.started_at.clone().into());
    properties.insert("distance_meters".to_string(), run.distance_meters.into());
    properties.insert("duration_seconds".to_string(), run.duration_seconds.into());
    if let Some(pace) = run.pace_seconds_per_km {
        properties.insert("pace_seconds_per_km".to_string(), pace.into());
    }

    Ok(Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&line))),
        id: Some(Id::String(run.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackSample;
    use chrono::{TimeZone, Utc};

    fn finished_run() -> FinishedRun {
        let sample = |lat: f64, lon: f64, index: u64| TrackSample {
            latitude: lat,
            longitude: lon,
            index,
        };
        FinishedRun {
            started_at: Some(Utc.with_ymd_and_hms(2024, 3, 9, 7, 0, 0).unwrap()),
            finished_at: Utc.with_ymd_and_hms(2024, 3, 9, 7, 30, 0).unwrap(),
            duration_seconds: 1800,
            distance_km: 5.0,
            path: vec![sample(1.3521, 103.8198, 0), sample(1.3531, 103.8198, 1)],
        }
    }

    #[tokio::test]
    async fn test_save_run_writes_run_post_and_stats() {
        let store = DocumentStore::in_memory();
        let service = RunService::new(store.clone());

        let record = service.save_run("alice", &finished_run(), None).await.unwrap();
        assert_eq!(record.title, "Morning run");
        assert_eq!(record.point_count, 2);
        assert_eq!(record.pace_seconds_per_km, Some(360.0));
        assert_eq!(record.created_at, "2024-03-09T07:30:00.000Z");

        let posts = store
            .query(&crate::db::CollectionQuery::new(collections::POSTS))
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
        let post: Post = posts[0].decode().unwrap();
        assert_eq!(post.kind, PostKind::Run);
        assert_eq!(post.run_id.as_deref(), Some(record.id.as_str()));

        let stats = service.stats("alice").await.unwrap();
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.runs_by_month.get("2024-03"), Some(&1));
    }

    #[tokio::test]
    async fn test_run_visible_to_owner_and_through_feed_post() {
        let store = DocumentStore::in_memory();
        let service = RunService::new(store.clone());
        let record = service.save_run("alice", &finished_run(), None).await.unwrap();

        assert!(service.get_visible_run(&record.id, "alice").await.is_ok());
        assert!(service.get_visible_run(&record.id, "bob").await.is_ok());

        let posts = store
            .query(&CollectionQuery::new(collections::POSTS))
            .await
            .unwrap();
        store.delete(collections::POSTS, &posts[0].id).await.unwrap();

        assert!(service.get_visible_run(&record.id, "alice").await.is_ok());
        assert!(matches!(
            service.get_visible_run(&record.id, "bob").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_group_shared_run_needs_membership() {
        let store = DocumentStore::in_memory();
        let service = RunService::new(store.clone());
        let record = service.save_run("alice", &finished_run(), None).await.unwrap();

        let posts = store
            .query(&CollectionQuery::new(collections::POSTS))
            .await
            .unwrap();
        let mut post: Post = posts[0].decode().unwrap();
        post.group_id = Some("g1".to_string());
        store.set(collections::POSTS, &post.id, &post).await.unwrap();
        let group = RunningGroup {
            id: "g1".to_string(),
            name: "Dawn Patrol".to_string(),
            description: String::new(),
            owner_id: "alice".to_string(),
            members: vec!["alice".to_string(), "carol".to_string()],
            member_count: 2,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
        };
        store.set(collections::GROUPS, "g1", &group).await.unwrap();

        assert!(service.get_visible_run(&record.id, "carol").await.is_ok());
        assert!(service.get_visible_run(&record.id, "bob").await.is_err());
    }

    #[tokio::test]
    async fn test_geojson_export() {
        let store = DocumentStore::in_memory();
        let service = RunService::new(store);
        let record = service
            .save_run("alice", &finished_run(), Some("  Tempo  "))
            .await
            .unwrap();
        assert_eq!(record.title, "Tempo");

        let feature = run_to_geojson(&service.get_run(&record.id).await.unwrap()).unwrap();
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["geometry"]["type"], "LineString");
        assert_eq!(json["geometry"]["coordinates"][1][1], 1.3531);
        assert_eq!(json["properties"]["title"], "Tempo");
    }

    #[test]
    fn test_default_titles() {
        assert_eq!(default_title(6), "Morning run");
        assert_eq!(default_title(13), "Afternoon run");
        assert_eq!(default_title(19), "Evening run");
        assert_eq!(default_title(2), "Night run");
    }
}
