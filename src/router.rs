//! Router / Dispatcher
//!
//! The broker's protocol state machine (§4.6): one handler per inbound
//! message type, plus the disconnect cascade (§4.8) shared by `leave` and an
//! abrupt transport close.

use serde_json::json;
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::room::Role;
use crate::ws::{Broker, ClientMessage, RawFrame, ServerMessage};

/// A connection's bound identity, as seen from outside the session.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub room_id: Option<String>,
    pub client_id: Option<String>,
}

/// Returned by [`dispatch`] when a frame successfully bound the connection
/// to a room/client identity (i.e. a successful `register`).
pub struct Bound {
    pub room_id: String,
    pub client_id: String,
}

/// Validate and route one inbound frame.
///
/// Every message besides `register` and `ping` requires the connection to
/// already be bound (§4.7: unbound connections may only exchange `register`,
/// `ping`, and error frames), and requires the frame's own `roomId`/`from` to
/// match that binding — a connection may only ever act as itself.
pub async fn dispatch(
    broker: &Broker,
    session: SessionView,
    raw: RawFrame,
    tx: &mpsc::Sender<ServerMessage>,
) -> Result<Option<Bound>, ProtocolError> {
    let Some(message) = crate::validator::validate(raw)? else {
        return Ok(None);
    };

    match message {
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong).await;
            Ok(None)
        }

        ClientMessage::Register {
            room_id,
            client_id,
            display_name,
            role,
        } => {
            // A connection is bound to exactly one identity for its lifetime
            // (§4.7 generalized, see DESIGN.md): a second `register` would
            // otherwise silently rebind the session to a new room/client
            // while leaving the old Member orphaned in its original room,
            // since nothing else ever runs that room's disconnect cascade
            // for it.
            if session.client_id.is_some() {
                return Err(ProtocolError::AlreadyRegistered);
            }
            handle_register(broker, room_id, client_id, display_name, role, tx).await
        }

        ClientMessage::Invite {
            room_id,
            from,
            to,
            payload,
        } => {
            let bound = require_bound(&session, &room_id, &from)?;
            handle_invite(broker, bound.0, from, to, payload, tx).await?;
            Ok(None)
        }

        ClientMessage::InviteResponse {
            room_id,
            from,
            to,
            accepted,
            invite_id,
        } => {
            require_bound(&session, &room_id, &from)?;
            handle_invite_response(broker, room_id, from, to, accepted, invite_id).await?;
            Ok(None)
        }

        ClientMessage::InviteCancel { invite_id, from } => {
            if session.client_id.as_deref() != Some(from.as_str()) {
                return Err(ProtocolError::NotRegistered);
            }
            handle_invite_cancel(broker, invite_id, from).await?;
            Ok(None)
        }

        ClientMessage::Signal {
            room_id,
            from,
            to,
            payload,
        } => {
            require_bound(&session, &room_id, &from)?;
            handle_signal(broker, room_id, from, to, payload).await?;
            Ok(None)
        }

        ClientMessage::PlayCommand {
            room_id,
            from,
            command,
            timestamp,
        } => {
            require_bound(&session, &room_id, &from)?;
            handle_play_command(broker, room_id, from, command, timestamp).await?;
            Ok(None)
        }

        ClientMessage::Leave { room_id, from } => {
            require_bound(&session, &room_id, &from)?;
            handle_disconnect(broker, &room_id, &from).await;
            Ok(None)
        }
    }
}

/// Check that a frame's claimed `roomId`/`from` matches the connection's
/// bound identity. Returns the bound room id on success.
fn require_bound<'a>(
    session: &'a SessionView,
    room_id: &str,
    from: &str,
) -> Result<(&'a str, &'a str), ProtocolError> {
    let bound_room = session.room_id.as_deref().ok_or(ProtocolError::NotRegistered)?;
    let bound_client = session
        .client_id
        .as_deref()
        .ok_or(ProtocolError::NotRegistered)?;

    if bound_room != room_id || bound_client != from {
        return Err(ProtocolError::NotRegistered);
    }

    Ok((bound_room, bound_client))
}

async fn handle_register(
    broker: &Broker,
    room_id: String,
    client_id: String,
    display_name: Option<String>,
    role: Role,
    tx: &mpsc::Sender<ServerMessage>,
) -> Result<Option<Bound>, ProtocolError> {
    let room = broker.rooms.get_or_create(&room_id).await;
    let member = room
        .register(&client_id, display_name, role, tx.clone())
        .await?;

    let roster = room.roster().await;
    let _ = tx
        .send(ServerMessage::Registered {
            client_id: member.client_id.clone(),
            display_name: member.display_name.clone(),
            role: member.role,
            room_id: room_id.clone(),
            clients: roster.clone(),
        })
        .await;
    room.broadcast_except(
        &member.client_id,
        ServerMessage::ClientsUpdated { clients: roster },
    )
    .await;

    Ok(Some(Bound {
        room_id,
        client_id: member.client_id,
    }))
}

async fn handle_invite(
    broker: &Broker,
    room_id: &str,
    from: String,
    to: String,
    payload: Option<serde_json::Value>,
    tx: &mpsc::Sender<ServerMessage>,
) -> Result<(), ProtocolError> {
    let room = broker
        .rooms
        .get(room_id)
        .await
        .ok_or(ProtocolError::RoomNotFound)?;
    let host = room.get(&from).await.ok_or(ProtocolError::NotRegistered)?;
    if host.role != Role::Host {
        return Err(ProtocolError::NotHost);
    }
    let target = room.get(&to).await.ok_or(ProtocolError::TargetNotFound)?;

    let payload =
        payload.unwrap_or_else(|| json!({"role": "speaker", "note": "Become my speaker?"}));

    let invite_id = broker
        .invites
        .create(
            broker.rooms.clone(),
            room_id.to_string(),
            from.clone(),
            to.clone(),
            payload.clone(),
        )
        .await;

    let delivered = room
        .send_to(
            &to,
            ServerMessage::Invite {
                invite_id: invite_id.clone(),
                from: from.clone(),
                from_display_name: host.display_name.clone(),
                payload,
            },
        )
        .await;

    if delivered.is_err() {
        broker.invites.remove(&invite_id).await;
        return Err(ProtocolError::TargetUnreachable);
    }

    let _ = tx
        .send(ServerMessage::InviteSent {
            invite_id,
            to,
            to_display_name: target.display_name.clone(),
        })
        .await;

    Ok(())
}

async fn handle_invite_response(
    broker: &Broker,
    room_id: String,
    from: String,
    to: String,
    accepted: bool,
    invite_id_echo: Option<String>,
) -> Result<(), ProtocolError> {
    // Invites are stored with `from` = host, `to` = invited target; a
    // response's `from` is the responder (the invite's target) and `to` is
    // the host, so the lookup is reversed from the wire fields.
    let invite = broker
        .invites
        .by_pair(&room_id, &to, &from)
        .await
        .ok_or(ProtocolError::NotInvited)?;
    broker.invites.remove(&invite.invite_id).await;

    let room = broker
        .rooms
        .get(&room_id)
        .await
        .ok_or(ProtocolError::RoomNotFound)?;
    let responder = room.get(&from).await.ok_or(ProtocolError::NotRegistered)?;

    if accepted {
        room.set_role(&from, Role::Speaker).await;
    }

    let _ = room
        .send_to(
            &to,
            ServerMessage::InviteResponse {
                invite_id: invite_id_echo.unwrap_or_else(|| invite.invite_id.clone()),
                from: from.clone(),
                from_display_name: responder.display_name.clone(),
                accepted,
            },
        )
        .await;

    if accepted {
        let roster = room.roster().await;
        room.broadcast_all(ServerMessage::ClientsUpdated { clients: roster })
            .await;
    }

    Ok(())
}

async fn handle_invite_cancel(
    broker: &Broker,
    invite_id: String,
    from: String,
) -> Result<(), ProtocolError> {
    let invite = broker
        .invites
        .by_id(&invite_id)
        .await
        .ok_or(ProtocolError::NotInvited)?;
    if invite.from != from {
        return Err(ProtocolError::NotInvited);
    }

    broker.invites.remove(&invite_id).await;

    if let Some(room) = broker.rooms.get(&invite.room_id).await {
        let _ = room
            .send_to(
                &invite.to,
                ServerMessage::InviteCancelled {
                    invite_id: invite.invite_id.clone(),
                    reason: None,
                },
            )
            .await;
    }

    Ok(())
}

async fn handle_signal(
    broker: &Broker,
    room_id: String,
    from: String,
    to: String,
    payload: serde_json::Value,
) -> Result<(), ProtocolError> {
    let room = broker
        .rooms
        .get(&room_id)
        .await
        .ok_or(ProtocolError::RoomNotFound)?;
    room.get(&from).await.ok_or(ProtocolError::NotRegistered)?;
    room.get(&to).await.ok_or(ProtocolError::TargetNotFound)?;

    room.send_to(&to, ServerMessage::Signal { from, payload })
        .await
        .map_err(|_| ProtocolError::TargetUnreachable)
}

async fn handle_play_command(
    broker: &Broker,
    room_id: String,
    from: String,
    command: String,
    timestamp: Option<serde_json::Value>,
) -> Result<(), ProtocolError> {
    let room = broker
        .rooms
        .get(&room_id)
        .await
        .ok_or(ProtocolError::RoomNotFound)?;
    let sender = room.get(&from).await.ok_or(ProtocolError::NotRegistered)?;
    if sender.role != Role::Host {
        return Err(ProtocolError::NotHost);
    }

    let timestamp = timestamp.unwrap_or_else(|| json!(crate::ws::now_millis()));
    room.broadcast_except(&from, ServerMessage::PlayCommand { command, timestamp })
        .await;

    Ok(())
}

/// Shared disconnect cascade (§4.8), driven by both `leave` and an abrupt
/// transport close.
pub async fn handle_disconnect(broker: &Broker, room_id: &str, client_id: &str) {
    let Some(room) = broker.rooms.get(room_id).await else {
        return;
    };
    let Some(member) = room.remove(client_id).await else {
        return;
    };

    if member.role == Role::Host {
        room.broadcast_all(ServerMessage::HostDisconnected {
            message: "Host has disconnected".to_string(),
        })
        .await;
        room.demote_all_speakers().await;
    }

    for invite in broker.invites.remove_for_client(client_id).await {
        if invite.from == client_id {
            let _ = room
                .send_to(
                    &invite.to,
                    ServerMessage::InviteCancelled {
                        invite_id: invite.invite_id.clone(),
                        reason: Some("Host disconnected".to_string()),
                    },
                )
                .await;
        } else {
            let _ = room
                .send_to(
                    &invite.from,
                    ServerMessage::InviteExpired {
                        invite_id: invite.invite_id.clone(),
                        to: Some(invite.to.clone()),
                        from: None,
                        reason: Some("Target disconnected".to_string()),
                    },
                )
                .await;
        }
    }

    if room.is_empty().await {
        broker.rooms.remove_if_empty(room_id).await;
    } else {
        let roster = room.roster().await;
        room.broadcast_all(ServerMessage::ClientsUpdated { clients: roster })
            .await;
    }
}
