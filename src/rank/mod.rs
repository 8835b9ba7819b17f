//! # Rank Module
//!
//! Turns stored usage into an ordered list of installed launchables.
//!
//! ## Components
//!
//! - [`Scorer`] - pure frequency × recency score for one record
//! - [`Query`] / [`MatchPolicy`] - case-insensitive label filtering
//! - [`RankingEngine`] - filter, score, sort and truncate a [`Candidate`] set
//! - [`stabilize`] - keep the shown order steady across small score changes
//! - [`QuerySession`] - discard queries superseded by a newer keystroke

pub mod candidate;
pub mod engine;
pub mod query;
pub mod scorer;
pub mod session;
pub mod stability;

pub use candidate::Candidate;
pub use engine::{RankOptions, Ranked, RankingEngine};
pub use query::{fold_case, MatchPolicy, Query};
pub use scorer::{compare_ranked, Scorer};
pub use session::{QuerySession, QueryTicket};
pub use stability::stabilize;
