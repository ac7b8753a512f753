//! Application configuration.
//!
//! Loaded from a TOML file, then overlaid with `PROBE__`-prefixed environment
//! variables (`PROBE__WINDOW__SECS=60`, `PROBE__COMPARISON__THRESHOLD_PCT=90`).

use crate::error::{AppError, AppResult};
use probe_compare::{CompareConfig, CompareMode, LookupCompareConfig};
use probe_core::{IdentityFilter, NetworkKey, SourceId, TrackingConfig};
use probe_feed::{AggregatorNormalizer, IndexerNormalizer, Normalizer};
use probe_lookup::LookupConfig;
use probe_ws::{AdapterConfig, FeedProtocol};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "PROBE";

/// Collection window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length. Default: 300 (5 minutes).
    #[serde(default = "default_window_secs")]
    pub secs: u64,
    /// How long adapters get to unsubscribe after the window closes (ms).
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_window_secs() -> u64 {
    300
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            secs: default_window_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl WindowConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// One stream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// WebSocket URL.
    pub url: String,
    pub protocol: FeedProtocol,
    /// Literal upgrade-request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Header name → environment variable holding its value (API keys).
    #[serde(default)]
    pub header_env: BTreeMap<String, String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for the subscription ack.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Application keepalive period; requires `keepalive_message`.
    #[serde(default)]
    pub keepalive_secs: Option<u64>,
    #[serde(default)]
    pub keepalive_message: Option<Value>,
    /// Network assumed for entities that carry none.
    #[serde(default)]
    pub fallback_network: Option<String>,
    /// Adapter → pump channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_channel_capacity() -> usize {
    4_096
}

impl SourceConfig {
    pub fn new(url: impl Into<String>, protocol: FeedProtocol) -> Self {
        Self {
            url: url.into(),
            protocol,
            headers: BTreeMap::new(),
            header_env: BTreeMap::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            keepalive_secs: None,
            keepalive_message: None,
            fallback_network: None,
            channel_capacity: default_channel_capacity(),
        }
    }

    /// Adapter settings for this source, with `header_env` resolved.
    pub fn adapter_config(&self, source: SourceId) -> AppResult<AdapterConfig> {
        let mut headers = self.headers.clone();
        for (header, var) in &self.header_env {
            let value = std::env::var(var).map_err(|_| {
                AppError::Config(format!(
                    "{source}: environment variable {var} for header {header} is not set"
                ))
            })?;
            headers.insert(header.clone(), value);
        }

        let mut config = AdapterConfig::new(source, self.url.clone(), self.protocol.clone());
        config.headers = headers;
        config.connect_timeout_ms = self.connect_timeout_ms;
        config.handshake_timeout_ms = self.handshake_timeout_ms;
        config.keepalive_interval_ms = self.keepalive_secs.map(|secs| secs * 1_000);
        config.keepalive_message = self.keepalive_message.clone();
        Ok(config)
    }

    /// Normalizer matching the wire protocol.
    pub fn normalizer(&self, source: SourceId) -> AppResult<Arc<dyn Normalizer>> {
        let fallback = self
            .fallback_network
            .as_ref()
            .map(|n| NetworkKey::new(n.clone()))
            .transpose()?;
        Ok(match self.protocol {
            FeedProtocol::Aggregator(_) => Arc::new(AggregatorNormalizer::new(source, fallback)),
            FeedProtocol::GraphQl(_) => Arc::new(IndexerNormalizer::new(source, fallback)),
        })
    }

    fn validate(&self, source: SourceId) -> AppResult<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::Config(format!("{source}: url must not be empty")));
        }
        if self.channel_capacity == 0 {
            return Err(AppError::Config(format!(
                "{source}: channel_capacity must be positive"
            )));
        }
        match (self.keepalive_secs, &self.keepalive_message) {
            (Some(0), _) => Err(AppError::Config(format!(
                "{source}: keepalive_secs must be positive"
            ))),
            (Some(_), None) => Err(AppError::Config(format!(
                "{source}: keepalive_secs requires keepalive_message"
            ))),
            _ => Ok(()),
        }
    }
}

/// Stream sources by role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub aggregator: Option<SourceConfig>,
    #[serde(default)]
    pub indexer: Option<SourceConfig>,
}

impl SourcesConfig {
    pub fn get(&self, source: SourceId) -> Option<&SourceConfig> {
        match source {
            SourceId::Aggregator => self.aggregator.as_ref(),
            SourceId::Indexer => self.indexer.as_ref(),
            SourceId::Lookup => None,
        }
    }

    /// Configured stream sources, in source order.
    pub fn configured(&self) -> Vec<(SourceId, &SourceConfig)> {
        [SourceId::Aggregator, SourceId::Indexer]
            .into_iter()
            .filter_map(|id| self.get(id).map(|cfg| (id, cfg)))
            .collect()
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub comparison: CompareConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    /// REST lookup service; required in lookup mode.
    #[serde(default)]
    pub lookup: Option<LookupConfig>,
}

impl AppConfig {
    /// Load configuration from a TOML file plus environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let file = parse_toml(&content)?;
        Self::from_layers(file, env_overrides()?)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        Self::from_layers(parse_toml(content)?, Value::Null)
    }

    fn from_layers(mut base: Value, overrides: Value) -> AppResult<Self> {
        merge(&mut base, overrides);
        serde_json::from_value(base)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Cross-field validation.
    pub fn validate(&self) -> AppResult<()> {
        IdentityFilter::from_config(&self.tracking)?;
        self.comparison.validate()?;

        if self.window.secs == 0 {
            return Err(AppError::Config("window.secs must be positive".to_string()));
        }

        let configured = self.sources.configured();
        if configured.is_empty() {
            return Err(AppError::Config(
                "at least one stream source must be configured".to_string(),
            ));
        }
        for (source, cfg) in &configured {
            cfg.validate(*source)?;
        }

        for required in self.comparison.required_sources() {
            if self.sources.get(required).is_none() {
                return Err(AppError::Config(format!(
                    "{required} is a required source but [sources.{required}] is missing"
                )));
            }
        }

        if self.comparison.mode == CompareMode::Lookup {
            match &self.lookup {
                Some(lookup) if !lookup.url.trim().is_empty() => {}
                _ => {
                    return Err(AppError::Config(
                        "lookup mode requires a [lookup] section with a url".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Lookup comparison settings; defaults when no `[lookup]` section exists.
    pub fn lookup_compare(&self) -> LookupCompareConfig {
        let mut config = LookupCompareConfig {
            threshold_pct: self.comparison.threshold_pct,
            ..Default::default()
        };
        if let Some(lookup) = &self.lookup {
            config.concurrency = lookup.concurrency;
            config.timeout = Duration::from_millis(lookup.timeout_ms);
        }
        config
    }
}

fn parse_toml(content: &str) -> AppResult<Value> {
    let doc: toml::Value = toml::from_str(content)
        .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
    Ok(serde_json::to_value(doc)?)
}

/// Keys whose override is kept verbatim; numeric parsing would turn a
/// suffix of "0444" into 444.
const LITERAL_KEYS: &[(&str, &str)] = &[("tracking", "suffix"), ("tracking", "network")];

/// `PROBE__SECTION__KEY=value` pairs as a nested JSON object.
fn env_overrides() -> AppResult<Value> {
    overrides_from(std::env::vars().collect())
}

fn overrides_from(vars: config::Map<String, String>) -> AppResult<Value> {
    let mut overrides = config::Config::builder()
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.clone())),
        )
        .build()
        .and_then(|c| c.try_deserialize::<Value>())
        .map_err(|e| AppError::Config(format!("Failed to read environment overrides: {e}")))?;

    for (section, key) in LITERAL_KEYS {
        let name = format!(
            "{ENV_PREFIX}__{}__{}",
            section.to_uppercase(),
            key.to_uppercase()
        );
        if let Some(raw) = vars.get(&name) {
            merge(&mut overrides, json!({ (*section): { (*key): raw } }));
        }
    }
    Ok(overrides)
}

/// Deep-merge `overlay` into `base`; overlay scalars win.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}
