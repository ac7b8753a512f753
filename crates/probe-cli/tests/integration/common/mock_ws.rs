//! Scripted WebSocket feeds for integration tests.
//!
//! `Script::Aggregator` waits for the first client message, then replays any
//! pre-ack frames, the ack and the data frames. `Script::GraphQl` speaks just
//! enough `graphql-transport-ws` to hand the payloads out as `next` messages.
//! Client text messages that parse as JSON are logged for later assertions.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Script {
    Aggregator {
        /// Sent after the subscribe message, before the ack.
        pre_ack: Vec<Message>,
        /// `None` never acknowledges.
        ack: Option<Value>,
        frames: Vec<Message>,
        /// Send a going-away close after the data frames.
        close_after: bool,
    },
    GraphQl {
        payloads: Vec<Value>,
    },
}

impl Script {
    /// Acks with `{"event": "subscribed"}`, then sends `frames` as text.
    pub fn aggregator(frames: Vec<Value>) -> Self {
        Self::Aggregator {
            pre_ack: Vec::new(),
            ack: Some(json!({"event": "subscribed"})),
            frames: frames.into_iter().map(text).collect(),
            close_after: false,
        }
    }

    pub fn graphql(payloads: Vec<Value>) -> Self {
        Self::GraphQl { payloads }
    }

    /// Replies to one client message. `started` tracks whether an aggregator
    /// script has already played.
    fn replies(&self, incoming: &Value, started: &mut bool) -> Vec<Message> {
        match self {
            Self::Aggregator {
                pre_ack,
                ack,
                frames,
                close_after,
            } => {
                if std::mem::replace(started, true) {
                    return Vec::new();
                }
                let mut out = pre_ack.clone();
                let Some(ack) = ack else {
                    return out;
                };
                out.push(text(ack.clone()));
                out.extend(frames.iter().cloned());
                if *close_after {
                    out.push(Message::Close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "going away".into(),
                    })));
                }
                out
            }
            Self::GraphQl { payloads } => match incoming["type"].as_str() {
                Some("connection_init") => vec![text(json!({"type": "connection_ack"}))],
                Some("subscribe") => payloads
                    .iter()
                    .map(|payload| {
                        text(json!({"id": incoming["id"], "type": "next", "payload": payload}))
                    })
                    .collect(),
                Some("ping") => vec![text(json!({"type": "pong"}))],
                _ => Vec::new(),
            },
        }
    }
}

pub fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}

#[derive(Default)]
struct ServerLog {
    accepted: AtomicUsize,
    inbound: Mutex<Vec<Value>>,
}

pub struct MockFeedServer {
    addr: SocketAddr,
    stop: CancellationToken,
    log: Arc<ServerLog>,
}

impl MockFeedServer {
    /// Bind an ephemeral localhost port and serve `script` to every client.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock feed");
        let addr = listener.local_addr().expect("mock feed address");
        let stop = CancellationToken::new();
        let log = Arc::new(ServerLog::default());

        let accept_stop = stop.clone();
        let accept_log = Arc::clone(&log);
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = accept_stop.cancelled() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => continue,
                    },
                };
                accept_log.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    script.clone(),
                    Arc::clone(&accept_log),
                    accept_stop.child_token(),
                ));
            }
        });

        Self { addr, stop, log }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.log.accepted.load(Ordering::SeqCst)
    }

    /// Client messages in arrival order.
    pub async fn received_json(&self) -> Vec<Value> {
        self.log.inbound.lock().await.clone()
    }

    pub async fn shutdown(self) {
        self.stop.cancel();
    }
}

/// A localhost URL with nothing listening behind it.
pub async fn refused_url() -> String {
    let probe = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe port");
    let addr = probe.local_addr().expect("probe port address");
    drop(probe);
    format!("ws://{addr}")
}

/// `graphql-transport-ws` clients reject a handshake that drops their sub-protocol.
fn echo_subprotocol(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    if let Some(protocol) = request.headers().get("sec-websocket-protocol") {
        response
            .headers_mut()
            .insert("sec-websocket-protocol", protocol.clone());
    }
    Ok(response)
}

async fn serve(stream: TcpStream, script: Script, log: Arc<ServerLog>, stop: CancellationToken) {
    let Ok(socket) = accept_hdr_async(stream, echo_subprotocol).await else {
        return;
    };
    let (mut sink, mut source) = socket.split();
    let mut started = false;

    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => return,
            frame = source.next() => frame,
        };
        let body = match frame {
            Some(Ok(Message::Text(body))) => body,
            Some(Ok(Message::Ping(payload))) => {
                let _ = sink.send(Message::Pong(payload)).await;
                continue;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        };

        let incoming: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        if !incoming.is_null() {
            log.inbound.lock().await.push(incoming.clone());
        }
        for reply in script.replies(&incoming, &mut started) {
            if sink.send(reply).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_binds_localhost() {
        let server = MockFeedServer::start(Script::aggregator(Vec::new())).await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        assert_eq!(server.connection_count(), 0);
        server.shutdown().await;
    }
}
