//! Feed adapter: one live connection scoped to one run.
//!
//! The adapter connects, performs the protocol handshake, and pushes
//! `FeedSignal`s into a channel until shutdown or transport failure. There is
//! no reconnection: any transport error ends the adapter's contribution and is
//! returned to the driver.

use crate::error::{WsError, WsResult};
use crate::frame::{decode_binary, decode_text};
use crate::message::{FeedProtocol, GRAPHQL_TRANSPORT_WS};
use crate::session::{ProtocolSession, SessionPhase, Step};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use probe_core::{RawEvent, SourceId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Signal pushed from an adapter to its consumer.
#[derive(Debug)]
pub enum FeedSignal {
    /// Decoded, acknowledged data frame.
    Event(RawEvent),
    /// A frame could not be decoded or decompressed.
    DecodeFailure { source: SourceId, reason: String },
    /// A data frame arrived before the subscription ack.
    PreAckDropped { source: SourceId },
}

impl FeedSignal {
    pub fn source(&self) -> SourceId {
        match self {
            Self::Event(raw) => raw.source,
            Self::DecodeFailure { source, .. } | Self::PreAckDropped { source } => *source,
        }
    }
}

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Fixed source identity stamped on every event.
    pub source: SourceId,
    /// WebSocket URL.
    pub url: String,
    /// Wire protocol.
    pub protocol: FeedProtocol,
    /// Extra upgrade-request headers (e.g. API keys).
    pub headers: BTreeMap<String, String>,
    /// TCP connect + WebSocket upgrade deadline.
    pub connect_timeout_ms: u64,
    /// Deadline for the subscription ack, measured from the upgrade.
    pub handshake_timeout_ms: u64,
    /// Application-level keepalive period.
    pub keepalive_interval_ms: Option<u64>,
    /// Keepalive message sent every period once acknowledged.
    pub keepalive_message: Option<serde_json::Value>,
}

impl AdapterConfig {
    pub fn new(source: SourceId, url: impl Into<String>, protocol: FeedProtocol) -> Self {
        Self {
            source,
            url: url.into(),
            protocol,
            headers: BTreeMap::new(),
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            keepalive_interval_ms: None,
            keepalive_message: None,
        }
    }
}

/// Adapter lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    Connecting,
    AwaitingAck,
    Streaming,
    Closed,
    Failed,
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterExit {
    /// Shutdown was requested by the driver.
    Shutdown,
    /// The consumer dropped its receiver.
    SinkClosed,
}

/// One feed connection.
pub struct FeedAdapter {
    config: AdapterConfig,
    state: Arc<RwLock<AdapterState>>,
}

impl FeedAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(AdapterState::Idle)),
        }
    }

    pub fn source(&self) -> SourceId {
        self.config.source
    }

    pub fn state(&self) -> AdapterState {
        *self.state.read()
    }

    /// Connect and stream until shutdown or failure.
    ///
    /// Returns `Err` for every transport failure: connect refused or timed
    /// out, handshake timeout, server close, stream end, subscription error.
    pub async fn run(
        &self,
        sink: mpsc::Sender<FeedSignal>,
        shutdown: CancellationToken,
    ) -> WsResult<AdapterExit> {
        let result = self.stream(&sink, &shutdown).await;
        *self.state.write() = match &result {
            Ok(_) => AdapterState::Closed,
            Err(_) => AdapterState::Failed,
        };
        result
    }

    async fn stream(
        &self,
        sink: &mpsc::Sender<FeedSignal>,
        shutdown: &CancellationToken,
    ) -> WsResult<AdapterExit> {
        let source = self.config.source;
        let request = self.build_request()?;
        *self.state.write() = AdapterState::Connecting;
        info!(
            %source,
            url = %self.config.url,
            protocol = self.config.protocol.name(),
            "Connecting feed"
        );

        let connect = tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            connect_async(request),
        );
        let (ws_stream, _response) = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(AdapterExit::Shutdown),
            res = connect => match res {
                Err(_) => return Err(WsError::ConnectTimeout(self.config.connect_timeout_ms)),
                Ok(Err(e)) => return Err(WsError::ConnectionFailed(e.to_string())),
                Ok(Ok(pair)) => pair,
            },
        };
        let (mut write, mut read) = ws_stream.split();
        info!(%source, "Feed connected");

        let mut session = ProtocolSession::new(self.config.protocol.clone());
        for frame in session.opening_frames() {
            write.send(Message::Text(frame)).await?;
        }
        self.sync_state(&session);

        let ack_deadline =
            Instant::now() + Duration::from_millis(self.config.handshake_timeout_ms);
        let mut keepalive = self.keepalive_timer();

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!(%source, "Shutdown signal received, closing feed");
                    for frame in session.closing_frames() {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            debug!(%source, ?e, "Failed to send closing frame during shutdown");
                        }
                    }
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(%source, ?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(AdapterExit::Shutdown);
                }

                () = tokio::time::sleep_until(ack_deadline), if !session.is_acknowledged() => {
                    warn!(
                        %source,
                        timeout_ms = self.config.handshake_timeout_ms,
                        "Subscription not acknowledged in time"
                    );
                    return Err(WsError::HandshakeTimeout(self.config.handshake_timeout_ms));
                }

                () = tick(&mut keepalive), if session.is_acknowledged() => {
                    if let Some(msg) = &self.config.keepalive_message {
                        write.send(Message::Text(msg.to_string())).await?;
                        debug!(%source, "Sent keepalive");
                    }
                }

                msg = read.next() => {
                    let decoded = match msg {
                        Some(Ok(Message::Text(text))) => decode_text(&text),
                        Some(Ok(Message::Binary(data))) => decode_binary(&data),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(%source, code, %reason, "Feed closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(%source, ?e, "Feed read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!(%source, "Feed stream ended");
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                        Some(Ok(_)) => continue,
                    };

                    let value = match decoded {
                        Ok(value) => value,
                        Err(e) => {
                            debug!(%source, error = %e, "Dropping undecodable frame");
                            let signal = FeedSignal::DecodeFailure { source, reason: e.to_string() };
                            if sink.send(signal).await.is_err() {
                                return Ok(AdapterExit::SinkClosed);
                            }
                            continue;
                        }
                    };

                    let signal = match session.on_message(value) {
                        Step::Deliver(payload) => Some(FeedSignal::Event(RawEvent::new(source, payload))),
                        Step::PreAck => Some(FeedSignal::PreAckDropped { source }),
                        Step::Reply(frames) => {
                            for frame in frames {
                                write.send(Message::Text(frame)).await?;
                            }
                            None
                        }
                        Step::Consumed => None,
                        Step::Completed => {
                            return Err(WsError::ConnectionClosed {
                                code: 1000,
                                reason: "Subscription completed by server".to_string(),
                            });
                        }
                        Step::Failed(e) => return Err(e),
                    };
                    self.sync_state(&session);

                    if let Some(signal) = signal {
                        if sink.send(signal).await.is_err() {
                            debug!(%source, "Feed sink dropped");
                            return Ok(AdapterExit::SinkClosed);
                        }
                    }
                }
            }
        }
    }

    fn build_request(&self) -> WsResult<Request> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| WsError::InvalidRequest(format!("{}: {e}", self.config.url)))?;

        let headers = request.headers_mut();
        if matches!(self.config.protocol, FeedProtocol::GraphQl(_)) {
            headers.insert(
                "Sec-WebSocket-Protocol",
                HeaderValue::from_static(GRAPHQL_TRANSPORT_WS),
            );
        }
        for (name, value) in &self.config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WsError::InvalidRequest(format!("header {name}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| WsError::InvalidRequest(format!("header {name}: {e}")))?;
            headers.insert(header_name, header_value);
        }
        Ok(request)
    }

    fn keepalive_timer(&self) -> Option<Interval> {
        let period = Duration::from_millis(self.config.keepalive_interval_ms?);
        self.config.keepalive_message.as_ref()?;
        Some(tokio::time::interval_at(Instant::now() + period, period))
    }

    fn sync_state(&self, session: &ProtocolSession) {
        *self.state.write() = match session.phase() {
            SessionPhase::AwaitingAck => AdapterState::AwaitingAck,
            SessionPhase::Acknowledged => AdapterState::Streaming,
            SessionPhase::Completed => AdapterState::Closed,
        };
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AggregatorProtocol, GraphQlProtocol};

    fn graphql_config() -> AdapterConfig {
        AdapterConfig::new(
            SourceId::Indexer,
            "ws://127.0.0.1:9/graphql",
            FeedProtocol::GraphQl(GraphQlProtocol {
                query: "subscription { tokens { address } }".to_string(),
                variables: None,
                operation_name: None,
                init_payload: None,
            }),
        )
    }

    #[test]
    fn test_default_timeouts() {
        let config = AdapterConfig::new(
            SourceId::Aggregator,
            "ws://localhost",
            FeedProtocol::Aggregator(AggregatorProtocol::default()),
        );
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.handshake_timeout_ms, 10_000);
        assert!(config.keepalive_interval_ms.is_none());
    }

    #[test]
    fn test_graphql_request_has_subprotocol() {
        let mut config = graphql_config();
        config
            .headers
            .insert("x-api-key".to_string(), "abc".to_string());
        let adapter = FeedAdapter::new(config);
        let request = adapter.build_request().unwrap();
        assert_eq!(
            request.headers().get("Sec-WebSocket-Protocol").unwrap(),
            GRAPHQL_TRANSPORT_WS
        );
        assert_eq!(request.headers().get("x-api-key").unwrap(), "abc");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut config = graphql_config();
        config
            .headers
            .insert("bad header".to_string(), "v".to_string());
        let adapter = FeedAdapter::new(config);
        assert!(matches!(
            adapter.build_request(),
            Err(WsError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_keepalive_requires_message() {
        let mut config = graphql_config();
        config.keepalive_interval_ms = Some(1000);
        let adapter = FeedAdapter::new(config.clone());
        tokio_test::block_on(async {
            assert!(adapter.keepalive_timer().is_none());
        });

        config.keepalive_message = Some(serde_json::json!({"op": "ping"}));
        let adapter = FeedAdapter::new(config);
        tokio_test::block_on(async {
            assert!(adapter.keepalive_timer().is_some());
        });
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let mut config = graphql_config();
        config.url = "ws://127.0.0.1:1".to_string();
        let adapter = FeedAdapter::new(config);
        let (tx, _rx) = mpsc::channel(8);

        let result = adapter.run(tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(WsError::ConnectionFailed(_))));
        assert_eq!(adapter.state(), AdapterState::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        let adapter = FeedAdapter::new(graphql_config());
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        token.cancel();

        let result = adapter.run(tx, token).await;
        assert_eq!(result.unwrap(), AdapterExit::Shutdown);
        assert_eq!(adapter.state(), AdapterState::Closed);
    }
}
