//! # Launchable Identity
//!
//! A stable key such as `com.example.mail.MainActivity`. It is the join key
//! between the externally enumerated apps and the stored usage, so it is
//! validated once on construction and immutable afterwards.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Longest accepted identity, in bytes.
pub const MAX_IDENTITY_LEN: usize = 512;

/// Validated, opaque launchable identity.
///
/// Ordering is plain byte-wise string ordering, which is what ranking uses
/// to break ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LaunchableId(String);

impl LaunchableId {
    /// Validate and wrap an identity string.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();

        if raw.trim().is_empty() {
            return Err(ValidationError::EmptyIdentity);
        }

        if raw.len() > MAX_IDENTITY_LEN {
            return Err(ValidationError::IdentityTooLong {
                len: raw.len(),
                max: MAX_IDENTITY_LEN,
            });
        }

        if raw.chars().any(char::is_control) {
            return Err(ValidationError::IdentityControlCharacter(raw));
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl TryFrom<String> for LaunchableId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for LaunchableId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LaunchableId> for String {
    fn from(id: LaunchableId) -> Self {
        id.0
    }
}

impl Borrow<str> for LaunchableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LaunchableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LaunchableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}
