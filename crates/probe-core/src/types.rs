//! Observation model shared by the feed, collector and comparator.

use crate::error::CoreError;
use crate::identity::{IdentityKey, NetworkKey};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream source identity. One fixed value per adapter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    /// Push-based WebSocket aggregator.
    Aggregator,
    /// GraphQL-subscription indexer.
    Indexer,
    /// On-demand REST lookup service.
    Lookup,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregator => "aggregator",
            Self::Indexer => "indexer",
            Self::Lookup => "lookup",
        }
    }

    /// Whether this source produces a live stream (as opposed to answering lookups).
    pub fn is_stream(&self) -> bool {
        !matches!(self, Self::Lookup)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggregator" => Ok(Self::Aggregator),
            "indexer" => Ok(Self::Indexer),
            "lookup" => Ok(Self::Lookup),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}

/// What an observation identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Token,
    Transaction,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Token, EntityKind::Transaction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction as reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Parse common upstream spellings (`buy`, `B`, `bid`, `sell`, `S`, `ask`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" | "bid" | "long" => Some(Self::Buy),
            "sell" | "s" | "ask" | "short" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Numeric payload carried for reporting only. Never used for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measures {
    pub price_usd: Option<Decimal>,
    pub volume_usd: Option<Decimal>,
    pub side: Option<TradeSide>,
}

impl Measures {
    pub fn is_empty(&self) -> bool {
        self.price_usd.is_none() && self.volume_usd.is_none() && self.side.is_none()
    }
}

/// Canonical unit produced by a normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Feed that produced this observation.
    pub source: SourceId,
    /// Token or transaction.
    pub kind: EntityKind,
    /// Deduplication key (token address or transaction hash).
    pub identity: IdentityKey,
    /// Token the event pertains to. Equal to `identity` for token observations.
    pub token: IdentityKey,
    /// Chain identity as reported (or defaulted) by the normalizer.
    pub network: NetworkKey,
    #[serde(default)]
    pub measures: Measures,
    /// Upstream event label (`created`, `trade`, `migrated`, ...).
    #[serde(default)]
    pub event_type: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    /// Token observation: identity and token are the same address.
    pub fn token(source: SourceId, address: IdentityKey, network: NetworkKey) -> Self {
        Self {
            source,
            kind: EntityKind::Token,
            token: address.clone(),
            identity: address,
            network,
            measures: Measures::default(),
            event_type: None,
            observed_at: Utc::now(),
        }
    }

    /// Transaction observation for a trade on `token`.
    pub fn transaction(
        source: SourceId,
        hash: IdentityKey,
        token: IdentityKey,
        network: NetworkKey,
    ) -> Self {
        Self {
            source,
            kind: EntityKind::Transaction,
            identity: hash,
            token,
            network,
            measures: Measures::default(),
            event_type: None,
            observed_at: Utc::now(),
        }
    }

    pub fn with_measures(mut self, measures: Measures) -> Self {
        self.measures = measures;
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// Decoded message as delivered by a transport adapter.
///
/// Ephemeral: consumed by exactly one normalizer call and never stored.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub source: SourceId,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(source: SourceId, payload: serde_json::Value) -> Self {
        Self {
            source,
            payload,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_source_id_roundtrip_str() {
        for source in [SourceId::Aggregator, SourceId::Indexer, SourceId::Lookup] {
            assert_eq!(source.as_str().parse::<SourceId>().unwrap(), source);
        }
        assert!("websocket".parse::<SourceId>().is_err());
        assert!(!SourceId::Lookup.is_stream());
    }

    #[test]
    fn test_trade_side_parse() {
        assert_eq!(TradeSide::parse("BUY"), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse("s"), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse("transfer"), None);
    }

    #[test]
    fn test_token_observation_shares_identity() {
        let addr = IdentityKey::parse("0xAB4444").unwrap();
        let obs = Observation::token(SourceId::Indexer, addr.clone(), NetworkKey::from_chain_id(56));
        assert_eq!(obs.kind, EntityKind::Token);
        assert_eq!(obs.identity, addr);
        assert_eq!(obs.token, addr);
    }

    #[test]
    fn test_measures_empty() {
        assert!(Measures::default().is_empty());
        let m = Measures {
            price_usd: Some(dec!(0.0012)),
            ..Default::default()
        };
        assert!(!m.is_empty());
    }
}
