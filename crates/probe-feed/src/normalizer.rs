//! Message normalization.
//!
//! Turns decoded feed messages into `Observation`s. All shape-sniffing for
//! upstream payloads lives here. Normalizers are pure: they never fail, they
//! skip what they cannot read and report how many entities they skipped.
//!
//! Supported shapes:
//! - Aggregator: `{"type": "snapshot", "data": [...]}`, `{"type": "update", "data": {...}}`,
//!   bare entity objects, or bare arrays of entities
//! - Indexer: GraphQL `next` payloads `{"data": {"<root>": [...] | {...}}}`, with
//!   nested `edges[].node`, `events`, `items` and `nodes` lists flattened

use chrono::{DateTime, Utc};
use probe_core::{IdentityKey, Measures, NetworkKey, Observation, RawEvent, SourceId, TradeSide};
use probe_ws::json_path;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

const TX_HASH_FIELDS: [&str; 2] = ["txHash", "transactionHash"];
/// Ambiguous hash key: token creations use it too, so it only marks a trade
/// when a side or volume is present.
const BARE_HASH_FIELD: &str = "hash";
const TOKEN_FIELDS: [&str; 5] = [
    "tokenAddress",
    "token.address",
    "address",
    "contractAddress",
    "token",
];
const NETWORK_FIELDS: [&str; 6] = [
    "chainId",
    "chain_id",
    "networkId",
    "network",
    "chain",
    "token.chainId",
];
const PRICE_FIELDS: [&str; 3] = ["priceUsd", "price_usd", "price"];
const VOLUME_FIELDS: [&str; 4] = ["volumeUsd", "amountUsd", "volume_usd", "volume"];
const SIDE_FIELDS: [&str; 4] = ["side", "type", "direction", "tradeType"];
const EVENT_FIELDS: [&str; 3] = ["eventType", "event_type", "event"];

/// Envelope keys that carry the entity list of an aggregator message.
const AGGREGATOR_BODY_KEYS: [&str; 3] = ["data", "tokens", "items"];
/// Aggregator message types that carry no data.
const CONTROL_TYPES: [&str; 7] = [
    "heartbeat",
    "ping",
    "pong",
    "subscribed",
    "unsubscribed",
    "info",
    "ack",
];
/// Nested list keys flattened in indexer payloads.
const INDEXER_LIST_KEYS: [&str; 4] = ["edges", "events", "items", "nodes"];
const MAX_NESTING: usize = 4;

/// Output of one normalizer call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub observations: Vec<Observation>,
    /// Entities that matched no known shape.
    pub skipped: u64,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty() && self.skipped == 0
    }

    fn skip(&mut self) {
        self.skipped += 1;
    }
}

/// Converts one feed's message shapes into observations.
pub trait Normalizer: Send + Sync {
    /// Source stamped on every produced observation.
    fn source(&self) -> SourceId;

    fn normalize(&self, raw: &RawEvent) -> Normalized;
}

/// Field-level extraction shared by every feed shape.
#[derive(Debug, Clone)]
struct EntityExtractor {
    source: SourceId,
    fallback_network: Option<NetworkKey>,
}

impl EntityExtractor {
    /// Classify one entity object and append its observations.
    ///
    /// A transaction hash makes the entity a trade, which yields a
    /// transaction observation plus a token observation for the traded token.
    fn extract(
        &self,
        entity: &Value,
        default_event: Option<&str>,
        received_at: DateTime<Utc>,
        out: &mut Normalized,
    ) {
        if !entity.is_object() {
            out.skip();
            return;
        }

        let Some(network) = self.network_of(entity) else {
            debug!(source = %self.source, "Skipping entity without network");
            out.skip();
            return;
        };

        let token = TOKEN_FIELDS
            .iter()
            .find_map(|path| string_field(entity, path))
            .and_then(|raw| IdentityKey::parse(raw).ok());
        let Some(token) = token else {
            debug!(source = %self.source, "Skipping entity without token address");
            out.skip();
            return;
        };

        let measures = measures_of(entity);
        let looks_like_trade = measures.side.is_some() || measures.volume_usd.is_some();
        let hash = TX_HASH_FIELDS
            .iter()
            .find_map(|path| string_field(entity, path))
            .or_else(|| {
                looks_like_trade
                    .then(|| string_field(entity, BARE_HASH_FIELD))
                    .flatten()
            })
            .and_then(|raw| IdentityKey::parse(raw).ok());
        let label = EVENT_FIELDS
            .iter()
            .find_map(|path| string_field(entity, path))
            .or(default_event);

        match hash {
            Some(hash) => {
                let mut trade = Observation::transaction(
                    self.source,
                    hash,
                    token.clone(),
                    network.clone(),
                )
                .with_measures(measures.clone())
                .with_event_type(label.unwrap_or("trade"));
                trade.observed_at = received_at;

                // Side and volume stay on the trade; the token only carries price.
                let mut traded = Observation::token(self.source, token, network)
                    .with_measures(Measures {
                        price_usd: measures.price_usd,
                        ..Default::default()
                    })
                    .with_event_type("trade");
                traded.observed_at = received_at;

                out.observations.push(trade);
                out.observations.push(traded);
            }
            None => {
                let mut obs =
                    Observation::token(self.source, token, network).with_measures(measures);
                if let Some(label) = label {
                    obs = obs.with_event_type(label);
                }
                obs.observed_at = received_at;
                out.observations.push(obs);
            }
        }
    }

    fn network_of(&self, entity: &Value) -> Option<NetworkKey> {
        NETWORK_FIELDS
            .iter()
            .find_map(|path| json_path(entity, path).and_then(network_value))
            .or_else(|| self.fallback_network.clone())
    }
}

/// Normalizer for the push-based WebSocket aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorNormalizer {
    extractor: EntityExtractor,
}

impl AggregatorNormalizer {
    pub fn new(source: SourceId, fallback_network: Option<NetworkKey>) -> Self {
        Self {
            extractor: EntityExtractor {
                source,
                fallback_network,
            },
        }
    }
}

impl Normalizer for AggregatorNormalizer {
    fn source(&self) -> SourceId {
        self.extractor.source
    }

    fn normalize(&self, raw: &RawEvent) -> Normalized {
        let mut out = Normalized::default();
        let at = raw.received_at;

        match &raw.payload {
            Value::Array(items) => {
                for item in items {
                    self.extractor.extract(item, None, at, &mut out);
                }
            }
            Value::Object(map) => {
                let label = map
                    .get("type")
                    .or_else(|| map.get("event"))
                    .and_then(Value::as_str);
                if label.is_some_and(|l| CONTROL_TYPES.contains(&l)) {
                    return out;
                }
                // Envelope labels "snapshot"/"update" describe delivery, not the event.
                let default_event = label.filter(|l| !matches!(*l, "snapshot" | "update"));

                match AGGREGATOR_BODY_KEYS.iter().find_map(|k| map.get(*k)) {
                    Some(Value::Array(items)) => {
                        for item in items {
                            self.extractor.extract(item, default_event, at, &mut out);
                        }
                    }
                    Some(entity @ Value::Object(_)) => {
                        self.extractor.extract(entity, default_event, at, &mut out);
                    }
                    Some(Value::Null) => {}
                    Some(_) => out.skip(),
                    None => self.extractor.extract(&raw.payload, None, at, &mut out),
                }
            }
            _ => out.skip(),
        }

        out
    }
}

/// Normalizer for GraphQL subscription payloads from the indexer.
#[derive(Debug, Clone)]
pub struct IndexerNormalizer {
    extractor: EntityExtractor,
}

impl IndexerNormalizer {
    pub fn new(source: SourceId, fallback_network: Option<NetworkKey>) -> Self {
        Self {
            extractor: EntityExtractor {
                source,
                fallback_network,
            },
        }
    }

    fn flatten(
        &self,
        value: &Value,
        root: &str,
        depth: usize,
        at: DateTime<Utc>,
        out: &mut Normalized,
    ) {
        if depth > MAX_NESTING {
            out.skip();
            return;
        }
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    self.flatten(item, root, depth + 1, at, out);
                }
            }
            Value::Object(map) => {
                let lists: Vec<(&str, &Vec<Value>)> = INDEXER_LIST_KEYS
                    .iter()
                    .filter_map(|k| map.get(*k).and_then(Value::as_array).map(|a| (*k, a)))
                    .collect();
                if !lists.is_empty() {
                    for (key, items) in lists {
                        for item in items {
                            let inner = if key == "edges" {
                                item.get("node").unwrap_or(item)
                            } else {
                                item
                            };
                            self.flatten(inner, root, depth + 1, at, out);
                        }
                    }
                } else if let Some(node @ Value::Object(_)) = map.get("node") {
                    self.flatten(node, root, depth + 1, at, out);
                } else {
                    self.extractor.extract(value, Some(root), at, out);
                }
            }
            _ => out.skip(),
        }
    }
}

impl Normalizer for IndexerNormalizer {
    fn source(&self) -> SourceId {
        self.extractor.source
    }

    fn normalize(&self, raw: &RawEvent) -> Normalized {
        let mut out = Normalized::default();

        match raw.payload.get("data") {
            Some(Value::Object(roots)) => {
                for (root, value) in roots {
                    self.flatten(value, root, 0, raw.received_at, &mut out);
                }
            }
            Some(Value::Null) | None if raw.payload.get("errors").is_some() => {
                warn!(
                    source = %self.extractor.source,
                    errors = %raw.payload["errors"],
                    "Indexer payload carried errors only"
                );
                out.skip();
            }
            _ => out.skip(),
        }

        out
    }
}

fn string_field<'a>(entity: &'a Value, path: &str) -> Option<&'a str> {
    json_path(entity, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn network_value(value: &Value) -> Option<NetworkKey> {
    match value {
        Value::Number(n) => n.as_u64().map(NetworkKey::from_chain_id),
        Value::String(s) => NetworkKey::new(s.as_str()).ok(),
        _ => None,
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn decimal_field(entity: &Value, fields: &[&str]) -> Option<Decimal> {
    fields
        .iter()
        .find_map(|path| json_path(entity, path).and_then(decimal_value))
}

fn side_of(entity: &Value) -> Option<TradeSide> {
    if let Some(is_buy) = entity.get("isBuy").and_then(Value::as_bool) {
        return Some(if is_buy { TradeSide::Buy } else { TradeSide::Sell });
    }
    SIDE_FIELDS
        .iter()
        .filter_map(|path| string_field(entity, path))
        .find_map(TradeSide::parse)
}

fn measures_of(entity: &Value) -> Measures {
    Measures {
        price_usd: decimal_field(entity, &PRICE_FIELDS),
        volume_usd: decimal_field(entity, &VOLUME_FIELDS),
        side: side_of(entity),
    }
}
