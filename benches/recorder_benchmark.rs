use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::{json, Map, Value};
use std::hint::black_box;
use std::sync::Arc;
use stride_tracker::db::{RemoteDocumentSnapshot, SnapshotEvent};
use stride_tracker::models::{Fix, Post};
use stride_tracker::services::views::post_filter;
use stride_tracker::services::{decode_as, Projection, TrackRecorder};
use stride_tracker::time_utils::ManualClock;

/// A two-hour run sampled every second: steady progress with GPS jitter,
/// plus a stretch of standing still at a crossing.
fn synthetic_track() -> Vec<Fix> {
    (0..7200)
        .map(|i| {
            let t = i as f64;
            let jitter = ((i * 7919) % 13) as f64 * 0.000_000_5;
            let progress = if (1800..1900).contains(&i) { 1800.0 } else { t };
            Fix::new(37.4 + progress * 0.000_025 + jitter, -122.1 + jitter, i * 1000)
        })
        .collect()
}

fn benchmark_recorder(c: &mut Criterion) {
    let track = synthetic_track();
    let clock = Arc::new(ManualClock::default());

    let mut group = c.benchmark_group("recorder");

    group.bench_function("two_hour_track", |b| {
        b.iter_batched(
            || {
                let mut recorder = TrackRecorder::new(clock.clone());
                recorder.start();
                recorder
            },
            |mut recorder| {
                for fix in &track {
                    recorder.on_fix(black_box(*fix));
                }
                recorder.finish()
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn feed_snapshot(count: usize) -> Vec<RemoteDocumentSnapshot> {
    (0..count)
        .map(|i| {
            let kind = if i % 3 == 0 { "run" } else { "text" };
            let fields: Map<String, Value> = match json!({
                "author_id": format!("user{}", i % 20),
                "kind": kind,
                "body": "Morning miles",
                "comment_count": i % 5,
                "created_at": format!("2024-01-01T00:{:02}:{:02}.000Z", (i / 60) % 60, i % 60),
            }) {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            RemoteDocumentSnapshot {
                id: format!("post{}", i),
                version: i as i64,
                fields,
            }
        })
        .collect()
}

fn benchmark_projection(c: &mut Criterion) {
    let snapshot = feed_snapshot(100);

    let mut group = c.benchmark_group("projection");

    group.bench_function("feed_unfiltered", |b| {
        let mut projection = Projection::new(decode_as::<Post>(), post_filter());
        b.iter(|| projection.apply(SnapshotEvent::Snapshot(black_box(snapshot.clone()))))
    });

    group.bench_function("feed_two_authors", |b| {
        let mut filter = post_filter();
        filter.select("author", "user1");
        filter.select("author", "user2");
        let mut projection = Projection::new(decode_as::<Post>(), filter);
        b.iter(|| projection.apply(SnapshotEvent::Snapshot(black_box(snapshot.clone()))))
    });

    group.finish();
}

criterion_group!(benches, benchmark_recorder, benchmark_projection);
criterion_main!(benches);
