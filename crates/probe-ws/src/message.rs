//! Protocol message types.

use serde::{Deserialize, Serialize};

/// WebSocket sub-protocol for GraphQL subscriptions.
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

/// Subscription id used for the single GraphQL subscription per connection.
pub const GRAPHQL_SUBSCRIPTION_ID: &str = "1";

// ============================================================================
// Protocol configuration
// ============================================================================

/// Wire protocol spoken by a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedProtocol {
    /// Push-based aggregator: subscribe messages, then an ack event.
    Aggregator(AggregatorProtocol),
    /// GraphQL subscription over `graphql-transport-ws`.
    #[serde(rename = "graphql")]
    GraphQl(GraphQlProtocol),
}

impl FeedProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aggregator(_) => "aggregator",
            Self::GraphQl(_) => "graphql",
        }
    }
}

/// Aggregator subscription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorProtocol {
    /// Messages sent verbatim after the connection opens.
    #[serde(default)]
    pub subscribe: Vec<serde_json::Value>,
    /// Whether data must wait for an explicit ack message.
    #[serde(default = "default_require_ack")]
    pub require_ack: bool,
    /// Dotted path of the ack marker field (e.g. "event" or "data.status").
    #[serde(default = "default_ack_field")]
    pub ack_field: String,
    /// Value of the ack marker field.
    #[serde(default = "default_ack_value")]
    pub ack_value: serde_json::Value,
}

fn default_require_ack() -> bool {
    true
}

fn default_ack_field() -> String {
    "event".to_string()
}

fn default_ack_value() -> serde_json::Value {
    serde_json::Value::String("subscribed".to_string())
}

impl Default for AggregatorProtocol {
    fn default() -> Self {
        Self {
            subscribe: Vec::new(),
            require_ack: default_require_ack(),
            ack_field: default_ack_field(),
            ack_value: default_ack_value(),
        }
    }
}

impl AggregatorProtocol {
    /// Check whether an incoming message is the subscription ack.
    pub fn is_ack(&self, msg: &serde_json::Value) -> bool {
        json_path(msg, &self.ack_field).is_some_and(|v| *v == self.ack_value)
    }
}

/// GraphQL subscription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlProtocol {
    /// Subscription document.
    pub query: String,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    #[serde(default)]
    pub operation_name: Option<String>,
    /// Payload of `connection_init` (typically credentials).
    #[serde(default)]
    pub init_payload: Option<serde_json::Value>,
}

// ============================================================================
// graphql-transport-ws messages
// ============================================================================

/// Client → server message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GqlClientMessage {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Subscribe {
        id: String,
        payload: GqlSubscribePayload,
    },
    Complete {
        id: String,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
}

impl GqlClientMessage {
    pub fn to_text(&self) -> String {
        // Serializing these variants cannot fail: all fields are plain JSON.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Payload of a `subscribe` message.
#[derive(Debug, Clone, Serialize)]
pub struct GqlSubscribePayload {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl From<&GraphQlProtocol> for GqlSubscribePayload {
    fn from(protocol: &GraphQlProtocol) -> Self {
        Self {
            query: protocol.query.clone(),
            variables: protocol.variables.clone(),
            operation_name: protocol.operation_name.clone(),
        }
    }
}

/// Server → client message.
///
/// `data` and `ka` come from the legacy `subscriptions-transport-ws`
/// protocol, which some indexers still emit.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GqlServerMessage {
    ConnectionAck {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    #[serde(alias = "data")]
    Next {
        id: String,
        payload: serde_json::Value,
    },
    Error {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        payload: serde_json::Value,
    },
    ConnectionError {
        #[serde(default)]
        payload: serde_json::Value,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Ka,
}

/// Follow a dotted path (`"a.b.0.c"`) into a JSON value.
///
/// Numeric segments index into arrays.
pub fn json_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        })
}
