//! Ranking tests against a real store: filtering, ordering, demotion,
//! stabilization, superseded queries and the per-keystroke latency budget.

use launchrank::rank::{Candidate, QuerySession, RankOptions, RankingEngine, Scorer};
use launchrank::recorder::EventRecorder;
use launchrank::usage::{LaunchableId, StoreOptions, UsageStore};
use launchrank::Config;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const MINUTE: i64 = 60_000;
const NOW: i64 = 1_700_000_000_000;

fn candidate(identity: &str, label: &str) -> Candidate {
    Candidate::new(LaunchableId::new(identity).unwrap(), label, None)
}

fn setup(temp_dir: &TempDir) -> (Arc<UsageStore>, EventRecorder) {
    let options = StoreOptions {
        retry_attempts: 1,
        retry_backoff: Duration::from_millis(1),
        fsync: false,
    };
    let store = Arc::new(UsageStore::open(temp_dir.path().join("usage.json"), options).unwrap());
    let recorder = EventRecorder::new(Arc::clone(&store));
    (store, recorder)
}

fn apps() -> Vec<Candidate> {
    vec![
        candidate("com.example.maps", "Maps"),
        candidate("com.example.calendar", "Calendar"),
        candidate("com.example.mail", "Mail"),
    ]
}

fn identities(ranked: &[launchrank::rank::Ranked<'_>]) -> Vec<String> {
    ranked.iter().map(|r| r.identity().to_string()).collect()
}

/// Only labels containing the query survive, best score first
#[test]
fn test_filter_correctness() {
    let temp_dir = TempDir::new().unwrap();
    let (store, recorder) = setup(&temp_dir);
    for _ in 0..3 {
        recorder.record_launch("com.example.mail", Some(NOW)).unwrap();
    }
    recorder.record_launch("com.example.maps", Some(NOW)).unwrap();

    let candidates = apps();
    let engine = RankingEngine::from_config(store, &Config::default());
    let ranked = engine.rank(&candidates, "MA", None, NOW);

    assert_eq!(
        identities(&ranked),
        vec!["com.example.mail", "com.example.maps"]
    );
    assert!(ranked[0].score > ranked[1].score);
}

/// Never-used candidates score zero and fall back to identity order
#[test]
fn test_unused_candidates_tie_on_identity() {
    let temp_dir = TempDir::new().unwrap();
    let (store, _) = setup(&temp_dir);

    let candidates = apps();
    let engine = RankingEngine::from_config(store, &Config::default());
    let ranked = engine.rank(&candidates, "", None, NOW);

    assert!(ranked.iter().all(|r| r.score == 0.0));
    assert_eq!(
        identities(&ranked),
        vec![
            "com.example.calendar",
            "com.example.mail",
            "com.example.maps"
        ]
    );
}

/// No match is an empty result, not an error
#[test]
fn test_no_match_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let (store, _) = setup(&temp_dir);

    let candidates = apps();
    let engine = RankingEngine::from_config(store, &Config::default());
    assert!(engine.rank(&candidates, "zzz", None, NOW).is_empty());
}

/// Recent use beats old use at the same count
#[test]
fn test_recency_breaks_equal_frequency() {
    let temp_dir = TempDir::new().unwrap();
    let (store, recorder) = setup(&temp_dir);
    recorder
        .record_launch("com.example.maps", Some(NOW - 30 * 24 * 60 * MINUTE))
        .unwrap();
    recorder.record_launch("com.example.calendar", Some(NOW - MINUTE)).unwrap();

    let candidates = apps();
    let engine = RankingEngine::from_config(store, &Config::default());
    let ranked = engine.rank(&candidates, "", Some(2), NOW);

    assert_eq!(
        identities(&ranked),
        vec!["com.example.calendar", "com.example.maps"]
    );
}

/// Settings entries lose ties against regular apps
#[test]
fn test_settings_are_demoted() {
    let temp_dir = TempDir::new().unwrap();
    let (store, recorder) = setup(&temp_dir);
    recorder.record_launch("android.settings.WIFI", Some(NOW)).unwrap();
    recorder.record_launch("com.example.wifi", Some(NOW)).unwrap();

    let candidates = vec![
        candidate("android.settings.WIFI", "Wi-Fi"),
        candidate("com.example.wifi", "Wifi Analyzer"),
    ];
    let engine = RankingEngine::from_config(store, &Config::default());
    let ranked = engine.rank(&candidates, "wi", None, NOW);

    assert_eq!(ranked[0].identity().as_str(), "com.example.wifi");
    assert!(ranked[1].score < ranked[0].score);
}

/// A previously shown order survives small score changes
#[test]
fn test_stable_rank_keeps_previous_order() {
    let temp_dir = TempDir::new().unwrap();
    let (store, recorder) = setup(&temp_dir);
    recorder.record_launch("com.example.mail", Some(NOW)).unwrap();
    recorder.record_launch("com.example.maps", Some(NOW - MINUTE)).unwrap();

    let candidates = apps();
    let engine = RankingEngine::from_config(store, &Config::default());
    let previous = ["com.example.maps", "com.example.mail", "com.example.calendar"];
    let ranked = engine.rank_stable(&candidates, "", None, NOW, &previous);

    assert_eq!(identities(&ranked), previous.to_vec());
}

/// A query superseded before it runs returns nothing
#[test]
fn test_superseded_query_is_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let (store, _) = setup(&temp_dir);
    let engine = RankingEngine::from_config(store, &Config::default());
    let candidates = apps();

    let session = QuerySession::new();
    let old = session.begin();
    let current = session.begin();

    assert!(engine
        .rank_cancellable(&candidates, "m", None, NOW, &old)
        .is_none());
    assert_eq!(
        engine
            .rank_cancellable(&candidates, "m", None, NOW, &current)
            .map(|r| r.len()),
        Some(2)
    );
}

/// An unreachable store degrades to alphabetical order
#[test]
fn test_closed_store_falls_back_to_alphabetical() {
    let temp_dir = TempDir::new().unwrap();
    let (store, recorder) = setup(&temp_dir);
    recorder.record_launch("com.example.maps", Some(NOW)).unwrap();
    store.close();

    let candidates = apps();
    let engine = RankingEngine::from_config(store, &Config::default());
    let ranked = engine.rank(&candidates, "", None, NOW);

    let labels: Vec<&str> = ranked.iter().map(|r| r.label()).collect();
    assert_eq!(labels, vec!["Calendar", "Mail", "Maps"]);
    assert!(ranked.iter().all(|r| r.score == 0.0));
}

/// 500 candidates with history, limit 10, well within a per-keystroke budget
#[test]
fn test_latency_with_500_candidates() {
    let temp_dir = TempDir::new().unwrap();
    let (store, recorder) = setup(&temp_dir);

    let candidates: Vec<Candidate> = (0..500)
        .map(|n| candidate(&format!("com.example.app{n:03}"), &format!("App {n:03}")))
        .collect();
    for n in (0..500).step_by(2) {
        recorder
            .record_launch(&format!("com.example.app{n:03}"), Some(NOW - n * MINUTE))
            .unwrap();
    }

    let engine = RankingEngine::new(
        store,
        Scorer::new(Duration::from_secs(7 * 24 * 3600)),
        RankOptions::default(),
    );

    // Warm up once, then time the keystroke-sized query.
    engine.rank(&candidates, "app", Some(10), NOW);
    let started = Instant::now();
    let ranked = engine.rank(&candidates, "app", Some(10), NOW);
    let elapsed = started.elapsed();

    assert_eq!(ranked.len(), 10);
    assert_eq!(ranked[0].identity().as_str(), "com.example.app000");
    assert!(
        elapsed < Duration::from_millis(250),
        "ranking took {elapsed:?}"
    );
}
