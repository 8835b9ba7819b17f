//! # Ranking Query Engine
//!
//! Joins the installed candidates with the stored usage and returns them
//! best first:
//!
//! 1. **Filter**: drop candidates whose label does not match the query.
//! 2. **Score**: look each survivor up in one store snapshot and score it;
//!    never-used candidates score 0.
//! 3. **Select**: partition the top `limit` to the front, then sort just
//!    those (descending score, ascending identity). Scores are compared in
//!    log space, so records too old for `score` to register still order
//!    by age and above never-used candidates.
//!
//! Everything happens in memory against an `Arc` snapshot, so a query
//! takes no lock while scoring and never blocks writers. If the store
//! cannot be read, candidates come back in alphabetical order instead.

use super::candidate::Candidate;
use super::query::{MatchPolicy, Query};
use super::scorer::{compare_ranked, Scorer};
use super::session::QueryTicket;
use super::stability::stabilize;
use crate::config::Config;
use crate::usage::{EpochMillis, LaunchableId, RecordMap, UsageSource, UsageStore};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Ranking knobs, usually taken from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankOptions {
    pub match_policy: MatchPolicy,
    pub default_limit: usize,
    pub demoted_prefixes: Vec<String>,
    pub demotion_factor: f64,
    pub stabilize_group_size: usize,
    pub latency_budget: Duration,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RankOptions {
    fn from(config: &Config) -> Self {
        Self {
            match_policy: config.match_policy,
            default_limit: config.result_limit,
            demoted_prefixes: config.demoted_prefixes.clone(),
            demotion_factor: config.demotion_factor,
            stabilize_group_size: config.stabilize_group_size,
            latency_budget: config.latency_budget(),
        }
    }
}

/// A candidate with the score it was ranked by.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<'a> {
    pub candidate: &'a Candidate,
    pub score: f64,
    /// `ln(score)`, computed without underflow.
    key: f64,
    position: usize,
}

impl<'a> Ranked<'a> {
    pub fn identity(&self) -> &'a LaunchableId {
        &self.candidate.identity
    }

    pub fn label(&self) -> &'a str {
        &self.candidate.label
    }
}

pub struct RankingEngine<S = UsageStore> {
    source: Arc<S>,
    scorer: Scorer,
    options: RankOptions,
}

impl<S: UsageSource> RankingEngine<S> {
    pub fn new(source: Arc<S>, scorer: Scorer, options: RankOptions) -> Self {
        Self {
            source,
            scorer,
            options,
        }
    }

    pub fn from_config(source: Arc<S>, config: &Config) -> Self {
        Self::new(source, Scorer::new(config.half_life()), RankOptions::from(config))
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn options(&self) -> &RankOptions {
        &self.options
    }

    /// Rank `candidates` matching `filter`, best first, at most `limit`
    /// entries (`None` uses the configured default). No match yields an
    /// empty list.
    pub fn rank<'a>(
        &self,
        candidates: &'a [Candidate],
        filter: &str,
        limit: Option<usize>,
        now: EpochMillis,
    ) -> Vec<Ranked<'a>> {
        self.rank_inner(candidates, filter, limit, now, || false)
            .unwrap_or_default()
    }

    /// Like [`RankingEngine::rank`], but gives up and returns `None` as soon
    /// as `ticket` has been superseded by a newer query.
    pub fn rank_cancellable<'a>(
        &self,
        candidates: &'a [Candidate],
        filter: &str,
        limit: Option<usize>,
        now: EpochMillis,
        ticket: &QueryTicket,
    ) -> Option<Vec<Ranked<'a>>> {
        if ticket.is_superseded() {
            return None;
        }
        let ranked = self.rank_inner(candidates, filter, limit, now, || ticket.is_superseded())?;
        ticket.is_current().then_some(ranked)
    }

    /// Rank, then keep items close to where `previous` showed them.
    pub fn rank_stable<'a, P: AsRef<str>>(
        &self,
        candidates: &'a [Candidate],
        filter: &str,
        limit: Option<usize>,
        now: EpochMillis,
        previous: &[P],
    ) -> Vec<Ranked<'a>> {
        let ranked = self.rank(candidates, filter, limit, now);
        stabilize(previous, ranked, self.options.stabilize_group_size, |r| {
            r.candidate.identity.as_str()
        })
    }

    fn rank_inner<'a>(
        &self,
        candidates: &'a [Candidate],
        filter: &str,
        limit: Option<usize>,
        now: EpochMillis,
        cancelled: impl Fn() -> bool,
    ) -> Option<Vec<Ranked<'a>>> {
        let started = Instant::now();
        let query = Query::new(filter, self.options.match_policy);
        let limit = limit.unwrap_or(self.options.default_limit);

        let matched = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| query.matches_folded(c.folded_label()));

        if cancelled() {
            return None;
        }

        let (mut ranked, compare): (Vec<Ranked<'a>>, fn(&Ranked, &Ranked) -> Ordering) =
            match self.source.snapshot() {
                Ok(records) => (
                    matched
                        .map(|(position, candidate)| {
                            let (score, key) = self.score_candidate(&records, candidate, now);
                            Ranked {
                                candidate,
                                score,
                                key,
                                position,
                            }
                        })
                        .collect(),
                    by_score,
                ),
                Err(e) => {
                    warn!(error = %e, "usage store unavailable, falling back to alphabetical order");
                    (
                        matched
                            .map(|(position, candidate)| Ranked {
                                candidate,
                                score: 0.0,
                                key: f64::NEG_INFINITY,
                                position,
                            })
                            .collect(),
                        alphabetical,
                    )
                }
            };

        if cancelled() {
            return None;
        }

        let matched_count = ranked.len();
        if limit < ranked.len() {
            if limit == 0 {
                ranked.clear();
            } else {
                ranked.select_nth_unstable_by(limit - 1, compare);
                ranked.truncate(limit);
            }
        }
        ranked.sort_unstable_by(compare);

        let elapsed = started.elapsed();
        if elapsed > self.options.latency_budget {
            warn!(
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.options.latency_budget.as_millis() as u64,
                candidates = candidates.len(),
                "ranking exceeded its latency budget"
            );
        } else {
            debug!(
                elapsed_us = elapsed.as_micros() as u64,
                candidates = candidates.len(),
                matched = matched_count,
                returned = ranked.len(),
                "ranked candidates"
            );
        }

        Some(ranked)
    }

    /// Display score and log-space ordering key for one candidate.
    fn score_candidate(
        &self,
        records: &RecordMap,
        candidate: &Candidate,
        now: EpochMillis,
    ) -> (f64, f64) {
        let Some(record) = records.get(&candidate.identity) else {
            return (0.0, f64::NEG_INFINITY);
        };
        let score = self.scorer.score(record, now);
        let key = self.scorer.rank_key(record, now);
        if self
            .options
            .demoted_prefixes
            .iter()
            .any(|prefix| candidate.identity.starts_with(prefix))
        {
            let factor = self.options.demotion_factor;
            (score * factor, key + factor.ln())
        } else {
            (score, key)
        }
    }
}

fn by_score(a: &Ranked, b: &Ranked) -> Ordering {
    compare_ranked(
        (a.key, a.candidate.identity.as_str()),
        (b.key, b.candidate.identity.as_str()),
    )
    .then_with(|| a.position.cmp(&b.position))
}

fn alphabetical(a: &Ranked, b: &Ranked) -> Ordering {
    a.candidate
        .folded_label()
        .cmp(b.candidate.folded_label())
        .then_with(|| a.candidate.identity.cmp(&b.candidate.identity))
        .then_with(|| a.position.cmp(&b.position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::rank::QuerySession;
    use crate::usage::UsageRecord;

    const DAY: i64 = 86_400_000;
    const NOW: i64 = 10_000 * DAY;

    /// In-memory source for engine tests.
    struct FixedSource(Option<Arc<RecordMap>>);

    impl FixedSource {
        fn with(records: &[(&str, u64, i64)]) -> Arc<Self> {
            let map = records
                .iter()
                .map(|&(id, count, last)| {
                    let identity = LaunchableId::new(id).unwrap();
                    let record = UsageRecord {
                        identity: identity.clone(),
                        launch_count: count,
                        last_used_at: last,
                        first_used_at: 0,
                    };
                    (identity, record)
                })
                .collect();
            Arc::new(Self(Some(Arc::new(map))))
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self(None))
        }
    }

    impl UsageSource for FixedSource {
        fn snapshot(&self) -> Result<Arc<RecordMap>, StoreError> {
            self.0.clone().ok_or(StoreError::Closed)
        }
    }

    fn candidate(id: &str, label: &str) -> Candidate {
        Candidate::new(LaunchableId::new(id).unwrap(), label, None)
    }

    fn engine(source: Arc<FixedSource>) -> RankingEngine<FixedSource> {
        RankingEngine::from_config(source, &Config::default())
    }

    fn ids(ranked: &[Ranked]) -> Vec<String> {
        ranked.iter().map(|r| r.identity().to_string()).collect()
    }

    #[test]
    fn test_used_before_unused() {
        let candidates = vec![candidate("ape", "Ape"), candidate("zebra", "Zebra")];
        let engine = engine(FixedSource::with(&[("zebra", 1, NOW)]));

        let ranked = engine.rank(&candidates, "", None, NOW);
        assert_eq!(ids(&ranked), vec!["zebra", "ape"]);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn test_recent_beats_old_with_same_count() {
        let candidates = vec![candidate("ape", "Ape"), candidate("zebra", "Zebra")];
        let engine = engine(FixedSource::with(&[("ape", 3, NOW - 5 * DAY), ("zebra", 3, NOW)]));

        assert_eq!(ids(&engine.rank(&candidates, "", None, NOW)), vec!["zebra", "ape"]);
    }

    #[test]
    fn test_ancient_usage_still_orders_by_age() {
        let candidates = vec![
            candidate("0.unused", "Unused"),
            candidate("a.old", "Old"),
            candidate("b.newer", "Newer"),
        ];
        // Over a thousand half-lives old: both scores underflow to zero.
        let engine = engine(FixedSource::with(&[("a.old", 5, 0), ("b.newer", 5, 2_000 * DAY)]));

        let ranked = engine.rank(&candidates, "", None, NOW);
        assert_eq!(ids(&ranked), vec!["b.newer", "a.old", "0.unused"]);
        assert!(ranked.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_ties_break_by_identity() {
        let candidates = vec![
            candidate("c", "Same"),
            candidate("a", "Same"),
            candidate("b", "Same"),
        ];
        let engine = engine(FixedSource::with(&[]));
        assert_eq!(ids(&engine.rank(&candidates, "", None, NOW)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_filter_then_limit() {
        let candidates = vec![
            candidate("maps", "Maps"),
            candidate("calendar", "Calendar"),
            candidate("mail", "Mail"),
        ];
        let engine = engine(FixedSource::with(&[("mail", 5, NOW), ("maps", 1, NOW)]));

        assert_eq!(ids(&engine.rank(&candidates, "ma", None, NOW)), vec!["mail", "maps"]);
        assert_eq!(ids(&engine.rank(&candidates, "MA", Some(1), NOW)), vec!["mail"]);
        assert!(engine.rank(&candidates, "ma", Some(0), NOW).is_empty());
        assert!(engine.rank(&candidates, "xyz", None, NOW).is_empty());
    }

    #[test]
    fn test_limit_keeps_the_best() {
        let candidates: Vec<Candidate> = (0..50)
            .map(|i| candidate(&format!("app{i:02}"), &format!("App {i}")))
            .collect();
        let usage: Vec<(String, u64, i64)> = (0..50)
            .map(|i| (format!("app{i:02}"), i as u64 + 1, NOW))
            .collect();
        let usage_refs: Vec<(&str, u64, i64)> =
            usage.iter().map(|(id, c, t)| (id.as_str(), *c, *t)).collect();
        let engine = engine(FixedSource::with(&usage_refs));

        let ranked = engine.rank(&candidates, "", Some(3), NOW);
        assert_eq!(ids(&ranked), vec!["app49", "app48", "app47"]);
    }

    #[test]
    fn test_settings_are_demoted() {
        let candidates = vec![
            candidate("com.android.settings.Wifi", "Wi-Fi"),
            candidate("org.example.wifi", "Wifi Analyzer"),
        ];
        let engine = engine(FixedSource::with(&[
            ("com.android.settings.Wifi", 2, NOW),
            ("org.example.wifi", 2, NOW),
        ]));

        let ranked = engine.rank(&candidates, "wi", None, NOW);
        assert_eq!(ids(&ranked), vec!["org.example.wifi", "com.android.settings.Wifi"]);
        assert!(ranked[1].score < ranked[0].score);
    }

    #[test]
    fn test_unavailable_store_falls_back_to_alphabetical() {
        let candidates = vec![
            candidate("z.id", "banana"),
            candidate("a.id", "Cherry"),
            candidate("m.id", "apple"),
        ];
        let engine = engine(FixedSource::broken());

        let ranked = engine.rank(&candidates, "", None, NOW);
        assert_eq!(ids(&ranked), vec!["m.id", "z.id", "a.id"]);
        assert!(ranked.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_superseded_query_is_discarded() {
        let candidates = vec![candidate("a", "A")];
        let engine = engine(FixedSource::with(&[]));
        let session = QuerySession::new();

        let stale = session.begin();
        let fresh = session.begin();

        assert!(engine
            .rank_cancellable(&candidates, "", None, NOW, &stale)
            .is_none());
        assert_eq!(
            engine
                .rank_cancellable(&candidates, "", None, NOW, &fresh)
                .map(|r| r.len()),
            Some(1)
        );
    }

    #[test]
    fn test_rank_stable_keeps_previous_slots() {
        let candidates = vec![candidate("a", "A"), candidate("b", "B")];
        // "b" now scores slightly higher, but "a" was shown first before.
        let engine = engine(FixedSource::with(&[("a", 3, NOW - DAY), ("b", 3, NOW)]));

        let plain = engine.rank(&candidates, "", None, NOW);
        assert_eq!(ids(&plain), vec!["b", "a"]);

        let stable = engine.rank_stable(&candidates, "", None, NOW, &["a", "b"]);
        assert_eq!(ids(&stable), vec!["a", "b"]);
    }
}
