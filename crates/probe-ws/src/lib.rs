//! Transport adapters for the coverage probe.
//!
//! Each adapter wraps one live feed and pushes decoded frames downstream:
//! - Aggregator protocol: plain WebSocket with subscribe messages and an ack event
//! - GraphQL protocol: `graphql-transport-ws` handshake and a single subscription
//! - Transparent decompression of binary frames (gzip, zlib, raw deflate)
//! - Events before the subscription ack are dropped and reported
//!
//! Adapters never retry. A failed connection is returned to the driver as an error.

pub mod adapter;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;

pub use adapter::{AdapterConfig, AdapterExit, AdapterState, FeedAdapter, FeedSignal};
pub use error::{WsError, WsResult};
pub use frame::{decode_binary, decode_text, FrameEncoding};
pub use message::{
    json_path, AggregatorProtocol, FeedProtocol, GqlClientMessage, GqlServerMessage,
    GqlSubscribePayload, GraphQlProtocol, GRAPHQL_TRANSPORT_WS,
};
pub use session::{ProtocolSession, SessionPhase, Step};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
