//! Frecency scoring.
//!
//! ```text
//! recency   = e^(-λ × age),  λ = ln(2) / half_life
//! frequency = ln(1 + launch_count)
//! score     = frequency × recency
//! ```
//!
//! An app launched one half-life ago weighs half as much as one launched
//! just now. Launchables without a record score 0.
//!
//! `score` underflows to 0 once a launch is about a thousand half-lives
//! old. Ordering uses [`Scorer::rank_key`] instead, which is `ln(score)`
//! evaluated in log space and stays strictly monotone for any age.

use crate::usage::{EpochMillis, UsageRecord};
use std::cmp::Ordering;
use std::time::Duration;

/// Pure scoring function parameterized by the half-life.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    half_life_millis: f64,
}

impl Scorer {
    pub fn new(half_life: Duration) -> Self {
        Self {
            half_life_millis: half_life.as_secs_f64() * 1000.0,
        }
    }

    pub fn half_life(&self) -> Duration {
        Duration::from_secs_f64(self.half_life_millis / 1000.0)
    }

    /// Score a record at time `now`. Higher is more likely to be launched.
    ///
    /// Launches in the future of `now` count as happening at `now`. A zero
    /// half-life only rewards launches at exactly `now`.
    pub fn score(&self, record: &UsageRecord, now: EpochMillis) -> f64 {
        let frequency = (record.launch_count as f64).ln_1p();
        frequency * self.recency_weight(record.age_millis(now))
    }

    /// `ln(score)` without underflow; never-used records map to
    /// negative infinity.
    pub fn rank_key(&self, record: &UsageRecord, now: EpochMillis) -> f64 {
        let frequency = (record.launch_count as f64).ln_1p();
        if frequency <= 0.0 {
            return f64::NEG_INFINITY;
        }
        frequency.ln() + self.log_recency_weight(record.age_millis(now))
    }

    /// Weight in `[0, 1]` for a launch `age_millis` ago.
    pub fn recency_weight(&self, age_millis: i64) -> f64 {
        self.log_recency_weight(age_millis).exp()
    }

    fn log_recency_weight(&self, age_millis: i64) -> f64 {
        let age = age_millis.max(0) as f64;
        if self.half_life_millis <= 0.0 {
            return if age == 0.0 { 0.0 } else { f64::NEG_INFINITY };
        }
        -std::f64::consts::LN_2 * age / self.half_life_millis
    }
}

/// Descending by score (or rank key), ties broken by ascending identity.
///
/// Scores are never NaN, but `total_cmp` keeps the ordering total anyway.
pub fn compare_ranked(
    (a_score, a_id): (f64, &str),
    (b_score, b_id): (f64, &str),
) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}
