//! Identity types used for deduplication and network matching.
//!
//! Identity keys are lower-cased at construction so that two feeds reporting
//! the same address with different casing always collapse to one identity.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of a token (contract address) or transaction (hash).
///
/// Always trimmed and lower-cased. Construction through `serde` applies the
/// same normalization, so keys read back from JSON compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Build a key from raw upstream text.
    ///
    /// Returns an error for empty (or whitespace-only) input.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidIdentity("empty identity".to_string()));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive suffix check. `suffix` may be in any case.
    pub fn ends_with_ignore_case(&self, suffix: &str) -> bool {
        self.0.ends_with(&suffix.to_lowercase())
    }
}

impl From<String> for IdentityKey {
    fn from(raw: String) -> Self {
        Self(raw.trim().to_lowercase())
    }
}

impl From<IdentityKey> for String {
    fn from(key: IdentityKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chain/network identity.
///
/// Compared exactly: no case folding and no alias resolution. Integer chain
/// ids are stored as their decimal rendering, so `56` and `"56"` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkKey(String);

impl NetworkKey {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidNetwork("empty network".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Network identity from a numeric chain id.
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self(chain_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
