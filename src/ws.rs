//! WebSocket Handler
//!
//! Wire protocol types (§6.1) and the Connection Supervisor (§4.7): accepts
//! inbound connections, drives the per-connection read loop through the rate
//! limiter and router, and runs the disconnect protocol (§4.8) on close.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::invite::InviteLedger;
use crate::room::{Role, RoomRegistry};
use crate::router;

/// Raw shape of an inbound frame before validation (§4.1, §4.3).
///
/// All fields are optional here; required-ness is a validator concern, not a
/// codec concern, so that a missing field produces a targeted validation
/// error rather than a blanket decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub room_id: Option<String>,
    pub client_id: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub invite_id: Option<String>,
    pub accepted: Option<bool>,
    pub payload: Option<serde_json::Value>,
}

/// A validated, typed inbound message (§6.1).
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Register {
        room_id: String,
        client_id: String,
        display_name: Option<String>,
        role: Role,
    },
    Invite {
        room_id: String,
        from: String,
        to: String,
        payload: Option<serde_json::Value>,
    },
    InviteResponse {
        room_id: String,
        from: String,
        to: String,
        accepted: bool,
        invite_id: Option<String>,
    },
    InviteCancel {
        invite_id: String,
        from: String,
    },
    Signal {
        room_id: String,
        from: String,
        to: String,
        payload: serde_json::Value,
    },
    PlayCommand {
        room_id: String,
        from: String,
        command: String,
        timestamp: Option<serde_json::Value>,
    },
    Leave {
        room_id: String,
        from: String,
    },
    Ping,
}

/// A roster entry as reported in `registered` / `clients-updated` (§4.4, §4.6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub client_id: String,
    pub display_name: String,
    pub role: Role,
}

/// Outbound frames (§6.1).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Registered {
        client_id: String,
        display_name: String,
        role: Role,
        room_id: String,
        clients: Vec<RosterEntry>,
    },
    #[serde(rename = "clients-updated")]
    ClientsUpdated { clients: Vec<RosterEntry> },
    Invite {
        invite_id: String,
        from: String,
        from_display_name: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "invite-sent")]
    InviteSent {
        invite_id: String,
        to: String,
        to_display_name: String,
    },
    #[serde(rename = "invite-response")]
    InviteResponse {
        invite_id: String,
        from: String,
        from_display_name: String,
        accepted: bool,
    },
    #[serde(rename = "invite-expired")]
    InviteExpired {
        invite_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "invite-cancelled")]
    InviteCancelled {
        invite_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Signal {
        from: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "play-command")]
    PlayCommand {
        command: String,
        timestamp: serde_json::Value,
    },
    #[serde(rename = "host-disconnected")]
    HostDisconnected { message: String },
    Pong,
    Error {
        message: String,
    },
}

/// Milliseconds since the Unix epoch, used to stamp `play-command` when the
/// caller omits `payload.timestamp` (§4.6).
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Shared broker state handed to every connection.
#[derive(Clone)]
pub struct Broker {
    pub rooms: Arc<RoomRegistry>,
    pub invites: Arc<InviteLedger>,
    pub config: Arc<crate::config::Config>,
}

/// WebSocket upgrade handler — `GET /ws`.
pub async fn handler(ws: WebSocketUpgrade, State(broker): State<Broker>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, broker))
}

/// Per-connection state: bound member identity (once registered) and the
/// rate-limit bucket, which belongs exclusively to this read loop (§5).
struct Session {
    room_id: Option<String>,
    client_id: Option<String>,
    bucket: crate::ratelimit::RateBucket,
}

async fn handle_socket(socket: WebSocket, broker: Broker) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    let sender_handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event).map_err(crate::error::BrokerError::from)
            {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to encode outbound frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        room_id: None,
        client_id: None,
        bucket: crate::ratelimit::RateBucket::new(
            broker.config.rate_limit_window,
            broker.config.rate_limit_max,
        ),
    };

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !session.bucket.admit() {
                    warn!(client_id = ?session.client_id, "rate limit exceeded, dropping frame");
                    let _ = tx
                        .send(ServerMessage::Error {
                            message: crate::error::ProtocolError::RateLimitExceeded.to_string(),
                        })
                        .await;
                    continue;
                }

                handle_frame(&text, &mut session, &broker, &tx).await;
            }
            Ok(Message::Close(_)) => {
                info!(client_id = ?session.client_id, "connection closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "websocket error");
                break;
            }
            _ => {}
        }
    }

    if let (Some(room_id), Some(client_id)) = (session.room_id.clone(), session.client_id.clone())
    {
        router::handle_disconnect(&broker, &room_id, &client_id).await;
    }

    sender_handle.abort();
}

async fn handle_frame(
    text: &str,
    session: &mut Session,
    broker: &Broker,
    tx: &mpsc::Sender<ServerMessage>,
) {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(_) => {
            let _ = tx
                .send(ServerMessage::Error {
                    message: crate::error::ProtocolError::InvalidJson.to_string(),
                })
                .await;
            return;
        }
    };

    debug!(msg_type = %raw.msg_type, client_id = ?session.client_id, "dispatching inbound frame");

    match router::dispatch(broker, session_view(session), raw, tx).await {
        Ok(Some(router::Bound { room_id, client_id })) => {
            session.room_id = Some(room_id);
            session.client_id = Some(client_id);
        }
        Ok(None) => {}
        Err(protocol_err) => {
            let _ = tx
                .send(ServerMessage::Error {
                    message: protocol_err.to_string(),
                })
                .await;
        }
    }
}

fn session_view(session: &Session) -> router::SessionView {
    router::SessionView {
        room_id: session.room_id.clone(),
        client_id: session.client_id.clone(),
    }
}
