//! Lookup configuration.

use serde::{Deserialize, Serialize};

/// REST lookup settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// URL template with `{network}` and `{identity}` placeholders.
    pub url: String,
    /// Environment variable holding the API key, if the service needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Header the API key is sent in.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Per-call timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum lookups in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    8
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: None,
            api_key_header: default_api_key_header(),
            timeout_ms: default_timeout_ms(),
            concurrency: default_concurrency(),
        }
    }
}
