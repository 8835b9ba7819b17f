//! # Usage Module
//!
//! Durable launch statistics, one [`UsageRecord`] per [`LaunchableId`].
//!
//! ## Storage
//!
//! Usage data is stored in a single versioned JSON file, by default in the
//! XDG-compliant data directory:
//! - Linux: `~/.local/share/launchrank/usage.json`
//! - macOS: `~/Library/Application Support/launchrank/usage.json`
//! - Windows: `%APPDATA%\launchrank\data\usage.json`
//!
//! The [`UsageStore`] is the only owner of the records; every other part of
//! the crate reads snapshots or goes through its atomic `upsert`/`delete`.

mod identity;
mod record;
pub mod schema;
mod store;

pub use identity::{LaunchableId, MAX_IDENTITY_LEN};
pub use record::{now_millis, validate_timestamp, EpochMillis, UsageRecord};
pub use store::{RecordMap, Scan, StoreOptions, UsageSource, UsageStore};
