//! Ranking benchmarks.
//!
//! Run with: cargo bench
//!
//! Target performance:
//! - Rank 500 candidates, limit 10: well under the 20ms latency budget

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use launchrank::rank::{stabilize, Candidate, RankingEngine};
use launchrank::recorder::EventRecorder;
use launchrank::usage::{LaunchableId, StoreOptions, UsageStore};
use launchrank::Config;
use std::sync::Arc;
use std::time::Duration;

const NOW: i64 = 1_700_000_000_000;
const MINUTE: i64 = 60_000;

fn candidates(count: usize) -> Vec<Candidate> {
    (0..count)
        .map(|i| {
            let identity = LaunchableId::new(format!("com.example.app{i:04}")).unwrap();
            Candidate::new(identity, format!("Application {i} Mail Maps"), None)
        })
        .collect()
}

/// Store with usage for every other candidate, spread over the past days.
fn populated_store(dir: &tempfile::TempDir, count: usize) -> Arc<UsageStore> {
    let options = StoreOptions {
        retry_attempts: 1,
        retry_backoff: Duration::from_millis(1),
        fsync: false,
    };
    let store = Arc::new(UsageStore::open(dir.path().join("usage.json"), options).unwrap());
    let recorder = EventRecorder::new(Arc::clone(&store));
    for i in (0..count).step_by(2) {
        let launches = 1 + i % 7;
        for n in 0..launches {
            let at = NOW - (i as i64) * 13 * MINUTE - (n as i64) * MINUTE;
            recorder
                .record_launch(&format!("com.example.app{i:04}"), Some(at))
                .unwrap();
        }
    }
    store
}

/// Benchmark a keystroke-sized rank call over increasing candidate sets.
fn bench_rank(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let store = populated_store(&dir, 500);
    let engine = RankingEngine::from_config(store, &Config::default());

    let mut group = c.benchmark_group("rank_limit_10");

    for count in [100, 250, 500] {
        let set = candidates(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &set, |b, set| {
            b.iter(|| black_box(engine.rank(set, black_box("ma"), Some(10), NOW).len()))
        });
    }

    group.finish();
}

/// Benchmark queries of different selectivity over 500 candidates.
fn bench_filters(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let store = populated_store(&dir, 500);
    let engine = RankingEngine::from_config(store, &Config::default());
    let set = candidates(500);

    let mut group = c.benchmark_group("rank_filter");

    for query in ["", "ma", "application 4", "nothing matches"] {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, query| {
            b.iter(|| black_box(engine.rank(&set, query, Some(10), NOW).len()))
        });
    }

    group.finish();
}

/// Benchmark stabilization of a full result page.
fn bench_stabilize(c: &mut Criterion) {
    let previous: Vec<String> = (0..20).rev().map(|i| format!("app{i}")).collect();
    let ranked: Vec<String> = (0..20).map(|i| format!("app{i}")).collect();

    c.bench_function("stabilize_20", |b| {
        b.iter(|| {
            let out = stabilize(&previous, ranked.clone(), 4, |s: &String| s.as_str());
            black_box(out)
        })
    });
}

criterion_group!(benches, bench_rank, bench_filters, bench_stabilize);
criterion_main!(benches);
