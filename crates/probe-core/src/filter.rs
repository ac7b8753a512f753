//! Admission gate for the tracked token population.

use crate::error::{CoreError, Result};
use crate::identity::NetworkKey;
use crate::types::Observation;
use serde::{Deserialize, Deserializer, Serialize};

/// Tracking configuration: which tokens count as "ours".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Target network identity (exact match).
    #[serde(deserialize_with = "string_or_number")]
    pub network: String,
    /// Literal address suffix (case-insensitive), e.g. "4444".
    #[serde(deserialize_with = "string_or_number")]
    pub suffix: String,
}

/// Accepts `network = 56` as well as `network = "56"`.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(u64),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => text,
        Scalar::Number(n) => n.to_string(),
    })
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            network: "56".to_string(),
            suffix: "4444".to_string(),
        }
    }
}

/// Decides whether an observation belongs to the tracked population.
///
/// Both conditions are mandatory:
/// 1. the observation's token address ends with the suffix (any case)
/// 2. the observation's network equals the target network exactly
#[derive(Debug, Clone)]
pub struct IdentityFilter {
    suffix: String,
    network: NetworkKey,
}

impl IdentityFilter {
    pub fn new(suffix: &str, network: NetworkKey) -> Result<Self> {
        let suffix = suffix.trim().to_lowercase();
        if suffix.is_empty() {
            return Err(CoreError::InvalidConfig(
                "tracking suffix must not be empty".to_string(),
            ));
        }
        Ok(Self { suffix, network })
    }

    pub fn from_config(config: &TrackingConfig) -> Result<Self> {
        Self::new(&config.suffix, NetworkKey::new(config.network.clone())?)
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn network(&self) -> &NetworkKey {
        &self.network
    }

    pub fn is_tracked(&self, obs: &Observation) -> bool {
        obs.network == self.network && obs.token.ends_with_ignore_case(&self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKey;
    use crate::types::SourceId;

    fn filter() -> IdentityFilter {
        IdentityFilter::new("4444", NetworkKey::from_chain_id(56)).unwrap()
    }

    fn token(addr: &str, network: NetworkKey) -> Observation {
        Observation::token(SourceId::Aggregator, IdentityKey::parse(addr).unwrap(), network)
    }

    #[test]
    fn test_suffix_and_network_match() {
        let obs = token("0xABCD4444", NetworkKey::from_chain_id(56));
        assert!(filter().is_tracked(&obs));
    }

    #[test]
    fn test_suffix_on_wrong_network_rejected() {
        let obs = token("0xabcd4444", NetworkKey::from_chain_id(1));
        assert!(!filter().is_tracked(&obs));
    }

    #[test]
    fn test_wrong_suffix_rejected() {
        let obs = token("0xabcd4445", NetworkKey::from_chain_id(56));
        assert!(!filter().is_tracked(&obs));
    }

    #[test]
    fn test_suffix_config_case_insensitive() {
        let filter = IdentityFilter::new("FfFf", NetworkKey::from_chain_id(56)).unwrap();
        let obs = token("0x1234ffff", NetworkKey::from_chain_id(56));
        assert!(filter.is_tracked(&obs));
    }

    #[test]
    fn test_transaction_filtered_by_token() {
        let obs = Observation::transaction(
            SourceId::Indexer,
            IdentityKey::parse("0xdeadbeef").unwrap(),
            IdentityKey::parse("0xabc4444").unwrap(),
            NetworkKey::from_chain_id(56),
        );
        assert!(filter().is_tracked(&obs));
    }

    #[test]
    fn test_network_not_fuzzy() {
        let filter = IdentityFilter::new("4444", NetworkKey::new("bsc").unwrap()).unwrap();
        let obs = token("0xabc4444", NetworkKey::new("BSC").unwrap());
        assert!(!filter.is_tracked(&obs));
    }

    #[test]
    fn test_tracking_config_accepts_numbers() {
        let config: TrackingConfig =
            serde_json::from_str(r#"{"network": 56, "suffix": 4444}"#).unwrap();
        assert_eq!(config, TrackingConfig::default());

        let config: TrackingConfig =
            serde_json::from_str(r#"{"network": "bsc", "suffix": "FFFF"}"#).unwrap();
        assert_eq!(config.network, "bsc");
    }

    #[test]
    fn test_empty_suffix_rejected() {
        assert!(IdentityFilter::new(" ", NetworkKey::from_chain_id(56)).is_err());
    }
}
