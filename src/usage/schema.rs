//! # On-Disk Layout
//!
//! The usage file is a single JSON document with an explicit version:
//!
//! ```json
//! {
//!   "version": 2,
//!   "records": [
//!     {
//!       "id": "com.example.mail.MainActivity",
//!       "launchCount": 42,
//!       "lastUsedAt": 1738751400000,
//!       "firstUsedAt": 1730000000000
//!     }
//!   ]
//! }
//! ```
//!
//! ## Versions
//!
//! | Version | Shape |
//! |---------|-------|
//! | 1 | bare array of launch events `[{"id": .., "timestamp": ..}]` |
//! | 2 | aggregated records, as above |
//!
//! Version 1 files are migrated on load by folding the events per identity.
//! Records are decoded one at a time so a single bad entry is skipped
//! instead of losing the whole file.

use super::identity::LaunchableId;
use super::record::{EpochMillis, UsageRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Version of the legacy launch-log layout.
pub const LEGACY_EVENT_LOG_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecordV2 {
    id: String,
    launch_count: u64,
    last_used_at: EpochMillis,
    first_used_at: EpochMillis,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LaunchEventV1 {
    id: String,
    timestamp: EpochMillis,
}

#[derive(Serialize)]
struct Document {
    version: u32,
    records: Vec<RecordV2>,
}

/// Why a document could not be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Malformed(String),
    UnsupportedVersion(u32),
}

/// Result of decoding a usage document.
#[derive(Debug, Default)]
pub struct Decoded {
    pub records: BTreeMap<LaunchableId, UsageRecord>,
    /// Version found on disk, before any migration.
    pub source_version: u32,
    /// Entries dropped because they were unreadable or broke an invariant.
    pub skipped: usize,
}

impl Decoded {
    pub fn needs_rewrite(&self) -> bool {
        self.source_version != CURRENT_VERSION || self.skipped > 0
    }

    fn insert(&mut self, record: UsageRecord) {
        match self.records.get_mut(&record.identity) {
            Some(existing) => existing.merge(&record),
            None => {
                self.records.insert(record.identity.clone(), record);
            }
        }
    }
}

/// Decode a usage document, migrating older layouts to the current one.
pub fn decode(text: &str) -> Result<Decoded, DecodeError> {
    if text.trim().is_empty() {
        return Ok(Decoded {
            source_version: CURRENT_VERSION,
            ..Decoded::default()
        });
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match value {
        Value::Array(events) => Ok(migrate_event_log(events)),
        Value::Object(mut document) => {
            let version = document
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| DecodeError::Malformed("missing `version` field".to_string()))?;
            let version =
                u32::try_from(version).map_err(|_| DecodeError::UnsupportedVersion(u32::MAX))?;

            if version > CURRENT_VERSION {
                return Err(DecodeError::UnsupportedVersion(version));
            }
            if version != CURRENT_VERSION {
                return Err(DecodeError::Malformed(format!(
                    "version {version} documents are not objects"
                )));
            }

            match document.remove("records") {
                Some(Value::Array(records)) => Ok(decode_records(records)),
                Some(_) => Err(DecodeError::Malformed("`records` is not an array".to_string())),
                None => Err(DecodeError::Malformed("missing `records` field".to_string())),
            }
        }
        _ => Err(DecodeError::Malformed(
            "expected an object or an array at the top level".to_string(),
        )),
    }
}

fn decode_records(records: Vec<Value>) -> Decoded {
    let mut decoded = Decoded {
        source_version: CURRENT_VERSION,
        ..Decoded::default()
    };

    for (index, raw) in records.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RecordV2>(raw)
            .map_err(|e| e.to_string())
            .and_then(|r| {
                let identity = LaunchableId::new(r.id).map_err(|e| e.to_string())?;
                let record = UsageRecord {
                    identity,
                    launch_count: r.launch_count,
                    last_used_at: r.last_used_at,
                    first_used_at: r.first_used_at,
                };
                record.check()?;
                Ok(record)
            });

        match parsed {
            Ok(record) => decoded.insert(record),
            Err(reason) => {
                warn!(index, %reason, "skipping corrupt usage record");
                decoded.skipped += 1;
            }
        }
    }

    decoded
}

fn migrate_event_log(events: Vec<Value>) -> Decoded {
    let mut decoded = Decoded {
        source_version: LEGACY_EVENT_LOG_VERSION,
        ..Decoded::default()
    };

    for (index, raw) in events.into_iter().enumerate() {
        let parsed = serde_json::from_value::<LaunchEventV1>(raw)
            .map_err(|e| e.to_string())
            .and_then(|event| {
                if event.timestamp < 0 {
                    return Err(format!("negative timestamp {}", event.timestamp));
                }
                let identity = LaunchableId::new(event.id).map_err(|e| e.to_string())?;
                Ok(UsageRecord::first_launch(identity, event.timestamp))
            });

        match parsed {
            Ok(record) => decoded.insert(record),
            Err(reason) => {
                warn!(index, %reason, "skipping corrupt launch event during migration");
                decoded.skipped += 1;
            }
        }
    }

    decoded
}

/// Encode records in the current layout, sorted by identity.
pub fn encode<'a>(
    records: impl IntoIterator<Item = &'a UsageRecord>,
) -> Result<Vec<u8>, serde_json::Error> {
    let document = Document {
        version: CURRENT_VERSION,
        records: records
            .into_iter()
            .map(|r| RecordV2 {
                id: r.identity.as_str().to_string(),
                launch_count: r.launch_count,
                last_used_at: r.last_used_at,
                first_used_at: r.first_used_at,
            })
            .collect(),
    };
    serde_json::to_vec_pretty(&document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> LaunchableId {
        LaunchableId::new(raw).unwrap()
    }

    #[test]
    fn test_empty_text_is_empty_store() {
        let decoded = decode("  \n").unwrap();
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.source_version, CURRENT_VERSION);
        assert!(!decoded.needs_rewrite());
    }

    #[test]
    fn test_encode_then_decode_current_version() {
        let mut mail = UsageRecord::first_launch(id("mail"), 1_000);
        mail = mail.with_launch(2_000);
        let maps = UsageRecord::first_launch(id("maps"), 500);

        let bytes = encode([&mail, &maps]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"version\": 2"));
        assert!(text.contains("\"launchCount\": 2"));

        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records.get("mail"), Some(&mail));
        assert_eq!(decoded.records.get("maps"), Some(&maps));
    }

    #[test]
    fn test_legacy_event_log_is_migrated() {
        let text = r#"[
            {"id": "mail", "timestamp": 100},
            {"id": "maps", "timestamp": 150},
            {"id": "mail", "timestamp": 300},
            {"id": "mail", "timestamp": 200}
        ]"#;

        let decoded = decode(text).unwrap();
        assert_eq!(decoded.source_version, LEGACY_EVENT_LOG_VERSION);
        assert!(decoded.needs_rewrite());

        let mail = decoded.records.get("mail").unwrap();
        assert_eq!(mail.launch_count, 3);
        assert_eq!(mail.last_used_at, 300);
        assert_eq!(mail.first_used_at, 100);

        let maps = decoded.records.get("maps").unwrap();
        assert_eq!(maps.launch_count, 1);
    }

    #[test]
    fn test_corrupt_records_are_skipped() {
        let text = r#"{
            "version": 2,
            "records": [
                {"id": "good", "launchCount": 2, "lastUsedAt": 20, "firstUsedAt": 10},
                {"id": "zero", "launchCount": 0, "lastUsedAt": 20, "firstUsedAt": 10},
                {"id": "", "launchCount": 1, "lastUsedAt": 20, "firstUsedAt": 20},
                {"id": "typo", "launchCount": "many", "lastUsedAt": 20, "firstUsedAt": 20},
                "not a record"
            ]
        }"#;

        let decoded = decode(text).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert!(decoded.records.contains_key("good"));
        assert_eq!(decoded.skipped, 4);
        assert!(decoded.needs_rewrite());
    }

    #[test]
    fn test_duplicate_records_are_merged() {
        let text = r#"{"version": 2, "records": [
            {"id": "a", "launchCount": 2, "lastUsedAt": 20, "firstUsedAt": 10},
            {"id": "a", "launchCount": 3, "lastUsedAt": 50, "firstUsedAt": 30}
        ]}"#;

        let decoded = decode(text).unwrap();
        let a = decoded.records.get("a").unwrap();
        assert_eq!(a.launch_count, 5);
        assert_eq!(a.last_used_at, 50);
        assert_eq!(a.first_used_at, 10);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let text = r#"{"version": 9, "records": []}"#;
        assert_eq!(decode(text).unwrap_err(), DecodeError::UnsupportedVersion(9));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(decode("not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("42"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"records": []}"#),
            Err(DecodeError::Malformed(_))
        ));
    }
}
