//! # Usage Record
//!
//! Aggregate launch statistics for one launchable. Timestamps are epoch
//! milliseconds (UTC).

use super::identity::LaunchableId;
use crate::error::ValidationError;
use chrono::{DateTime, TimeZone, Utc};

/// Epoch milliseconds.
pub type EpochMillis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

/// Reject timestamps before the epoch.
pub fn validate_timestamp(at: EpochMillis) -> Result<EpochMillis, ValidationError> {
    if at < 0 {
        return Err(ValidationError::NegativeTimestamp(at));
    }
    Ok(at)
}

/// Usage statistics for a single launchable.
///
/// A record only exists once the launchable has been launched, so
/// `launch_count` is always at least 1 and `first_used_at <= last_used_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub identity: LaunchableId,
    pub launch_count: u64,
    pub last_used_at: EpochMillis,
    pub first_used_at: EpochMillis,
}

impl UsageRecord {
    /// Record for a launchable seen for the first time.
    pub fn first_launch(identity: LaunchableId, at: EpochMillis) -> Self {
        Self {
            identity,
            launch_count: 1,
            last_used_at: at,
            first_used_at: at,
        }
    }

    /// Apply one more launch.
    ///
    /// Out-of-order timestamps still count, but never move `last_used_at`
    /// backwards.
    pub fn with_launch(&self, at: EpochMillis) -> Self {
        Self {
            identity: self.identity.clone(),
            launch_count: self.launch_count.saturating_add(1),
            last_used_at: self.last_used_at.max(at),
            first_used_at: self.first_used_at.min(at),
        }
    }

    /// Fold another record for the same identity into this one.
    pub fn merge(&mut self, other: &UsageRecord) {
        self.launch_count = self.launch_count.saturating_add(other.launch_count);
        self.last_used_at = self.last_used_at.max(other.last_used_at);
        self.first_used_at = self.first_used_at.min(other.first_used_at);
    }

    /// Check the record invariants, describing the first violation.
    pub fn check(&self) -> Result<(), String> {
        if self.launch_count == 0 {
            return Err("launch count is zero".to_string());
        }
        if self.last_used_at < 0 || self.first_used_at < 0 {
            return Err("negative timestamp".to_string());
        }
        if self.first_used_at > self.last_used_at {
            return Err(format!(
                "first use {} is after last use {}",
                self.first_used_at, self.last_used_at
            ));
        }
        Ok(())
    }

    /// Milliseconds between the last launch and `now`, never negative.
    pub fn age_millis(&self, now: EpochMillis) -> i64 {
        now.saturating_sub(self.last_used_at).max(0)
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_used_at).single()
    }
}
