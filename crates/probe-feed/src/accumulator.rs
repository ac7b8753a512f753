//! Per-(source, kind) accumulation of admitted observations.

use chrono::{DateTime, Utc};
use probe_core::{IdentityKey, Measures, Observation, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// First admission of an identity. Never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstSeen {
    /// Monotonic offset from window open, in milliseconds.
    pub offset_ms: u64,
    pub observed_at: DateTime<Utc>,
    pub measures: Measures,
    pub event_type: Option<String>,
}

/// Accumulator for one source and one entity kind.
///
/// `seen` is first-write-wins: the first admitted observation for a key fixes
/// its first-seen record. Secondary counters count every admission,
/// duplicates included.
#[derive(Debug, Default)]
pub struct SourceAccumulator {
    seen: HashMap<IdentityKey, FirstSeen>,
    admitted: u64,
    buys: u64,
    sells: u64,
    event_types: BTreeMap<String, u64>,
    volume_usd: Decimal,
}

impl SourceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an admissible observation. Returns `true` for a new identity.
    pub fn admit(&mut self, obs: Observation, offset: Duration) -> bool {
        self.admitted += 1;
        match obs.measures.side {
            Some(TradeSide::Buy) => self.buys += 1,
            Some(TradeSide::Sell) => self.sells += 1,
            None => {}
        }
        if let Some(label) = &obs.event_type {
            *self.event_types.entry(label.clone()).or_default() += 1;
        }
        if let Some(volume) = obs.measures.volume_usd {
            self.volume_usd += volume;
        }

        match self.seen.entry(obs.identity) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(FirstSeen {
                    offset_ms: u64::try_from(offset.as_millis()).unwrap_or(u64::MAX),
                    observed_at: obs.observed_at,
                    measures: obs.measures,
                    event_type: obs.event_type,
                });
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, identity: &IdentityKey) -> bool {
        self.seen.contains_key(identity)
    }

    pub fn first_seen(&self, identity: &IdentityKey) -> Option<&FirstSeen> {
        self.seen.get(identity)
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// Drop everything accumulated so far.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> AccumulatorSnapshot {
        AccumulatorSnapshot {
            seen: self
                .seen
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            admitted: self.admitted,
            buys: self.buys,
            sells: self.sells,
            event_types: self.event_types.clone(),
            volume_usd: self.volume_usd,
        }
    }
}

/// Frozen copy of a `SourceAccumulator`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorSnapshot {
    pub seen: BTreeMap<IdentityKey, FirstSeen>,
    pub admitted: u64,
    pub buys: u64,
    pub sells: u64,
    pub event_types: BTreeMap<String, u64>,
    pub volume_usd: Decimal,
}

impl AccumulatorSnapshot {
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, identity: &IdentityKey) -> bool {
        self.seen.contains_key(identity)
    }

    /// Identities in sorted order.
    pub fn identities(&self) -> impl Iterator<Item = &IdentityKey> {
        self.seen.keys()
    }
}

impl FromIterator<IdentityKey> for AccumulatorSnapshot {
    /// Build a snapshot holding only identities (one admission each).
    fn from_iter<I: IntoIterator<Item = IdentityKey>>(iter: I) -> Self {
        let mut snapshot = Self::default();
        for identity in iter {
            snapshot.admitted += 1;
            snapshot.seen.entry(identity).or_insert_with(|| FirstSeen {
                offset_ms: 0,
                observed_at: Utc::now(),
                measures: Measures::default(),
                event_type: None,
            });
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::{NetworkKey, SourceId};
    use rust_decimal_macros::dec;

    fn trade(hash: &str, side: TradeSide, volume: Decimal) -> Observation {
        Observation::transaction(
            SourceId::Aggregator,
            IdentityKey::parse(hash).unwrap(),
            IdentityKey::parse("0xabc4444").unwrap(),
            NetworkKey::from_chain_id(56),
        )
        .with_measures(Measures {
            price_usd: Some(volume),
            volume_usd: Some(volume),
            side: Some(side),
        })
        .with_event_type("trade")
    }

    #[test]
    fn test_first_write_wins() {
        let mut acc = SourceAccumulator::new();
        assert!(acc.admit(trade("0x01", TradeSide::Buy, dec!(10)), Duration::from_millis(5)));
        assert!(!acc.admit(trade("0x01", TradeSide::Sell, dec!(99)), Duration::from_millis(50)));

        let key = IdentityKey::parse("0x01").unwrap();
        let first = acc.first_seen(&key).unwrap();
        assert_eq!(first.offset_ms, 5);
        assert_eq!(first.measures.price_usd, Some(dec!(10)));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_secondary_counters_count_duplicates() {
        let mut acc = SourceAccumulator::new();
        acc.admit(trade("0x01", TradeSide::Buy, dec!(10)), Duration::ZERO);
        acc.admit(trade("0x01", TradeSide::Sell, dec!(5)), Duration::ZERO);
        acc.admit(trade("0x02", TradeSide::Buy, dec!(1.5)), Duration::ZERO);

        let snap = acc.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.admitted, 3);
        assert_eq!(snap.buys, 2);
        assert_eq!(snap.sells, 1);
        assert_eq!(snap.event_types.get("trade"), Some(&3));
        assert_eq!(snap.volume_usd, dec!(16.5));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut acc = SourceAccumulator::new();
        acc.admit(trade("0x01", TradeSide::Buy, dec!(10)), Duration::ZERO);
        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.admitted(), 0);
        assert_eq!(acc.snapshot(), AccumulatorSnapshot::default());
    }

    #[test]
    fn test_snapshot_from_identities() {
        let snap: AccumulatorSnapshot = ["0xA", "0xa", "0xb"]
            .into_iter()
            .map(|s| IdentityKey::parse(s).unwrap())
            .collect();
        assert_eq!(snap.len(), 2);
        let ids: Vec<&str> = snap.identities().map(IdentityKey::as_str).collect();
        assert_eq!(ids, vec!["0xa", "0xb"]);
    }
}
