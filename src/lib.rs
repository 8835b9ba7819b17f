//! Launchrank - usage-history ranking and persistence for an app launcher
//!
//! This library records which launchables a user opens, keeps that history
//! durable on disk, and ranks the installed launchables by a combined
//! frequency and recency score for a search query.
//!
//! - [`usage`] - identities, usage records and the durable store
//! - [`recorder`] - synchronous and queued launch recording
//! - [`rank`] - scoring, filtering, ranking and order stabilization
//! - [`maintenance`] - pruning uninstalled, stale and surplus records
//! - [`config`] / [`logging`] / [`error`] - ambient plumbing

pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod rank;
pub mod recorder;
pub mod usage;

pub use config::Config;
pub use error::{Error, Result};
pub use rank::{Candidate, RankingEngine};
pub use recorder::EventRecorder;
pub use usage::{LaunchableId, UsageRecord, UsageStore};
