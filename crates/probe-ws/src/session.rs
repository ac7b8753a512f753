//! Per-connection protocol session.
//!
//! Tracks the handshake/subscription phase and classifies every decoded
//! message. Data is delivered downstream only after the subscription has been
//! acknowledged; anything earlier is out of protocol and dropped.

use crate::error::WsError;
use crate::message::{
    FeedProtocol, GqlClientMessage, GqlServerMessage, GqlSubscribePayload, GraphQlProtocol,
    GRAPHQL_SUBSCRIPTION_ID,
};
use tracing::{debug, info, warn};

/// Handshake phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Opening messages sent, waiting for the ack.
    AwaitingAck,
    /// Subscription acknowledged; data flows downstream.
    Acknowledged,
    /// Server completed the subscription.
    Completed,
}

/// What the adapter should do with one decoded message.
#[derive(Debug)]
pub enum Step {
    /// Forward this payload downstream.
    Deliver(serde_json::Value),
    /// Data arrived before the ack; drop it.
    PreAck,
    /// Send these text frames to the server.
    Reply(Vec<String>),
    /// Control message consumed, nothing to do.
    Consumed,
    /// Server ended the subscription.
    Completed,
    /// Protocol-level failure; the transport is unusable for this run.
    Failed(WsError),
}

/// Protocol session state machine.
pub struct ProtocolSession {
    protocol: FeedProtocol,
    phase: SessionPhase,
}

impl ProtocolSession {
    pub fn new(protocol: FeedProtocol) -> Self {
        let phase = match &protocol {
            FeedProtocol::Aggregator(p) if !p.require_ack => SessionPhase::Acknowledged,
            _ => SessionPhase::AwaitingAck,
        };
        Self { protocol, phase }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_acknowledged(&self) -> bool {
        self.phase == SessionPhase::Acknowledged
    }

    /// Frames to send right after the WebSocket upgrade.
    pub fn opening_frames(&self) -> Vec<String> {
        match &self.protocol {
            FeedProtocol::Aggregator(p) => p.subscribe.iter().map(|m| m.to_string()).collect(),
            FeedProtocol::GraphQl(p) => vec![GqlClientMessage::ConnectionInit {
                payload: p.init_payload.clone(),
            }
            .to_text()],
        }
    }

    /// Frames to send on graceful shutdown (before the Close frame).
    pub fn closing_frames(&self) -> Vec<String> {
        match &self.protocol {
            FeedProtocol::GraphQl(_) if self.is_acknowledged() => vec![GqlClientMessage::Complete {
                id: GRAPHQL_SUBSCRIPTION_ID.to_string(),
            }
            .to_text()],
            _ => Vec::new(),
        }
    }

    /// Classify one decoded message.
    pub fn on_message(&mut self, msg: serde_json::Value) -> Step {
        match &self.protocol {
            FeedProtocol::Aggregator(p) => {
                if p.require_ack && p.is_ack(&msg) {
                    // Repeated acks (one per subscribe message) are consumed too.
                    if self.phase == SessionPhase::AwaitingAck {
                        info!("Aggregator subscription acknowledged");
                        self.phase = SessionPhase::Acknowledged;
                    }
                    return Step::Consumed;
                }
                match self.phase {
                    SessionPhase::Acknowledged => Step::Deliver(msg),
                    SessionPhase::AwaitingAck => Step::PreAck,
                    SessionPhase::Completed => Step::Consumed,
                }
            }
            FeedProtocol::GraphQl(p) => {
                let (step, phase) = graphql_step(p, self.phase, msg);
                self.phase = phase;
                step
            }
        }
    }
}

fn graphql_step(
    protocol: &GraphQlProtocol,
    phase: SessionPhase,
    msg: serde_json::Value,
) -> (Step, SessionPhase) {
    let parsed: GqlServerMessage = match serde_json::from_value(msg) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognized GraphQL message");
            return (Step::Consumed, phase);
        }
    };

    match parsed {
        GqlServerMessage::ConnectionAck { .. } => {
            if phase != SessionPhase::AwaitingAck {
                return (Step::Consumed, phase);
            }
            info!("GraphQL connection acknowledged, subscribing");
            let subscribe = GqlClientMessage::Subscribe {
                id: GRAPHQL_SUBSCRIPTION_ID.to_string(),
                payload: GqlSubscribePayload::from(protocol),
            };
            (Step::Reply(vec![subscribe.to_text()]), SessionPhase::Acknowledged)
        }
        GqlServerMessage::Next { id, payload } => {
            if phase != SessionPhase::Acknowledged {
                return (Step::PreAck, phase);
            }
            if id != GRAPHQL_SUBSCRIPTION_ID {
                debug!(%id, "Ignoring payload for unknown subscription id");
                return (Step::Consumed, phase);
            }
            (Step::Deliver(payload), phase)
        }
        GqlServerMessage::Error { id, payload } => {
            warn!(?id, ?payload, "GraphQL subscription error");
            (
                Step::Failed(WsError::SubscriptionRejected(payload.to_string())),
                phase,
            )
        }
        GqlServerMessage::ConnectionError { payload } => {
            warn!(?payload, "GraphQL connection error");
            (
                Step::Failed(WsError::SubscriptionRejected(payload.to_string())),
                phase,
            )
        }
        GqlServerMessage::Complete { id } => {
            if id == GRAPHQL_SUBSCRIPTION_ID {
                info!("GraphQL subscription completed by server");
                (Step::Completed, SessionPhase::Completed)
            } else {
                (Step::Consumed, phase)
            }
        }
        GqlServerMessage::Ping { payload } => {
            let pong = GqlClientMessage::Pong { payload };
            (Step::Reply(vec![pong.to_text()]), phase)
        }
        GqlServerMessage::Pong { .. } | GqlServerMessage::Ka => (Step::Consumed, phase),
    }
}
