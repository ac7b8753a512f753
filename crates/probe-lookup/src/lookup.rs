//! Reference lookup seam.

use crate::error::LookupResult;
use async_trait::async_trait;
use probe_core::IdentityKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the reference service knows about one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub identity: IdentityKey,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub price_usd: Option<Decimal>,
}

impl EntityRecord {
    pub fn new(identity: IdentityKey) -> Self {
        Self {
            identity,
            name: None,
            symbol: None,
            price_usd: None,
        }
    }
}

/// On-demand reference source.
///
/// `Ok(None)` is a definitive "not found". `Err` means the outcome is unknown
/// and must not count for or against coverage.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn lookup(&self, identity: &IdentityKey) -> LookupResult<Option<EntityRecord>>;
}
