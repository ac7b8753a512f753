//! HTTP client for the REST lookup service.

use crate::config::LookupConfig;
use crate::error::{LookupError, LookupResult};
use crate::lookup::{EntityRecord, ReferenceLookup};
use async_trait::async_trait;
use probe_core::{IdentityKey, NetworkKey};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const IDENTITY_PLACEHOLDER: &str = "{identity}";
const NETWORK_PLACEHOLDER: &str = "{network}";

/// `ReferenceLookup` over `GET <url template>`.
pub struct RestLookupClient {
    client: Client,
    url_template: String,
    network: NetworkKey,
    timeout_ms: u64,
    api_key: Option<(String, String)>,
}

impl RestLookupClient {
    /// Create a client.
    ///
    /// The template must contain `{identity}`; `{network}` is optional.
    pub fn new(
        url_template: impl Into<String>,
        network: NetworkKey,
        timeout: Duration,
    ) -> LookupResult<Self> {
        let url_template = url_template.into();
        if !url_template.contains(IDENTITY_PLACEHOLDER) {
            return Err(LookupError::InvalidConfig(format!(
                "url template must contain {IDENTITY_PLACEHOLDER}: {url_template}"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url_template,
            network,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            api_key: None,
        })
    }

    /// Build a client from config, reading the API key from the named env var.
    pub fn from_config(config: &LookupConfig, network: NetworkKey) -> LookupResult<Self> {
        let client = Self::new(
            config.url.clone(),
            network,
            Duration::from_millis(config.timeout_ms),
        )?;
        match &config.api_key_env {
            Some(var) => {
                let key = std::env::var(var).map_err(|_| {
                    LookupError::InvalidConfig(format!("environment variable {var} is not set"))
                })?;
                info!(header = %config.api_key_header, env = %var, "Lookup API key configured");
                Ok(client.with_api_key(config.api_key_header.clone(), key))
            }
            None => Ok(client),
        }
    }

    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some((header.into(), key.into()));
        self
    }

    /// Concrete URL for one identity.
    pub fn url_for(&self, identity: &IdentityKey) -> String {
        self.url_template
            .replace(NETWORK_PLACEHOLDER, self.network.as_str())
            .replace(IDENTITY_PLACEHOLDER, identity.as_str())
    }
}

#[async_trait]
impl ReferenceLookup for RestLookupClient {
    async fn lookup(&self, identity: &IdentityKey) -> LookupResult<Option<EntityRecord>> {
        let url = self.url_for(identity);
        let mut request = self.client.get(&url);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout(self.timeout_ms)
            } else {
                LookupError::HttpClient(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%identity, "Lookup: not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::HttpClient(format!("Failed to read response: {e}")))?;
        record_from_body(identity, &body)
    }
}

/// Interpret a successful response body.
///
/// Empty body, `null`, `[]`, or an envelope whose `data` is one of those means
/// "not found". Arrays yield their first element.
pub fn record_from_body(identity: &IdentityKey, body: &str) -> LookupResult<Option<EntityRecord>> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| LookupError::InvalidResponse(format!("not JSON: {e}")))?;

    let entity = match &value {
        Value::Object(map) if map.contains_key("data") => &map["data"],
        _ => &value,
    };
    let entity = match entity {
        Value::Null => return Ok(None),
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return Ok(None),
        },
        Value::Object(_) => entity,
        other => {
            return Err(LookupError::InvalidResponse(format!(
                "unexpected body type: {other}"
            )))
        }
    };

    let text = |key: &str| entity.get(key).and_then(Value::as_str).map(str::to_string);
    let price_usd = ["priceUsd", "price_usd", "price"]
        .iter()
        .find_map(|key| match entity.get(*key) {
            Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
            Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        });

    Ok(Some(EntityRecord {
        identity: identity.clone(),
        name: text("name"),
        symbol: text("symbol"),
        price_usd,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn key(s: &str) -> IdentityKey {
        IdentityKey::parse(s).unwrap()
    }

    /// Serve exactly one HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> RestLookupClient {
        RestLookupClient::new(
            format!("{base}/tokens/{{network}}/{{identity}}"),
            NetworkKey::from_chain_id(56),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_template_requires_identity() {
        let result = RestLookupClient::new(
            "http://localhost/tokens",
            NetworkKey::from_chain_id(56),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(LookupError::InvalidConfig(_))));
    }

    #[test]
    fn test_url_for_substitutes_placeholders() {
        let c = client("http://localhost:8080");
        assert_eq!(
            c.url_for(&key("0xABC4444")),
            "http://localhost:8080/tokens/56/0xabc4444"
        );
    }

    #[test]
    fn test_missing_api_key_env_is_config_error() {
        let config = LookupConfig {
            url: "http://localhost/{identity}".to_string(),
            api_key_env: Some("PROBE_TEST_UNSET_LOOKUP_KEY".to_string()),
            ..Default::default()
        };
        let result = RestLookupClient::from_config(&config, NetworkKey::from_chain_id(56));
        assert!(matches!(result, Err(LookupError::InvalidConfig(_))));
    }

    #[test]
    fn test_record_from_body_shapes() {
        let id = key("0xa4444");
        assert_eq!(record_from_body(&id, "").unwrap(), None);
        assert_eq!(record_from_body(&id, "null").unwrap(), None);
        assert_eq!(record_from_body(&id, "[]").unwrap(), None);
        assert_eq!(record_from_body(&id, r#"{"data": []}"#).unwrap(), None);

        let record = record_from_body(&id, r#"{"data": {"name": "Four", "symbol": "FOUR", "priceUsd": "0.25"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.symbol.as_deref(), Some("FOUR"));
        assert_eq!(record.price_usd, Some(dec!(0.25)));

        let record = record_from_body(&id, r#"[{"name": "First"}, {"name": "Second"}]"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.name.as_deref(), Some("First"));

        assert!(record_from_body(&id, "<html>").is_err());
        assert!(record_from_body(&id, "42").is_err());
    }

    #[tokio::test]
    async fn test_lookup_found() {
        let base = serve_once("200 OK", r#"{"name": "Four", "symbol": "FOUR"}"#).await;
        let record = client(&base).lookup(&key("0xa4444")).await.unwrap().unwrap();
        assert_eq!(record.identity, key("0xa4444"));
        assert_eq!(record.name.as_deref(), Some("Four"));
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let base = serve_once("404 Not Found", "").await;
        assert!(client(&base).lookup(&key("0xa4444")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_server_error_is_unknown() {
        let base = serve_once("503 Service Unavailable", "busy").await;
        let err = client(&base).lookup(&key("0xa4444")).await.unwrap_err();
        assert!(matches!(err, LookupError::Status { status: 503, .. }));
    }
}
