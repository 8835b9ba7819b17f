//! # Error Types
//!
//! Every fallible library operation returns one of the enums below. The
//! binary wraps them in [`anyhow::Error`] with extra context.
//!
//! | Error | Raised by |
//! |-------|-----------|
//! | [`ValidationError`] | bad identities, timestamps, configuration values |
//! | [`StoreError`] | the usage store (I/O, corruption, closed store) |
//! | [`RecorderError`] | the asynchronous launch queue |
//!
//! Looking up or deleting an identity that has no record is not an error:
//! `get` returns `None` and `delete` returns `false`.

use std::path::PathBuf;
use thiserror::Error;

/// Input rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("launchable identity cannot be empty")]
    EmptyIdentity,

    #[error("launchable identity is {len} bytes long, the maximum is {max}")]
    IdentityTooLong { len: usize, max: usize },

    #[error("launchable identity contains a control character: {0:?}")]
    IdentityControlCharacter(String),

    #[error("timestamp must not be negative, got {0}")]
    NegativeTimestamp(i64),

    #[error("invalid configuration value for `{field}`: {reason}")]
    Config { field: &'static str, reason: String },
}

/// Failures of the durable usage store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {} after {attempts} attempt(s): {source}", path.display())]
    Io {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("usage file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("usage file {} has schema version {found}, newest supported is {supported}", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("usage store has been closed")]
    Closed,
}

/// Failures of the asynchronous launch queue.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("launch queue is closed")]
    QueueClosed,

    #[error("launch queue is full")]
    QueueFull,

    #[error("launch writer stopped before acknowledging the event")]
    WriterGone,
}

/// Umbrella error for the public API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
