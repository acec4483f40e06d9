//! Frame Validator
//!
//! Lifts a permissively-decoded [`RawFrame`](crate::ws::RawFrame) into a
//! typed [`ClientMessage`](crate::ws::ClientMessage), checking required
//! fields and `roomId` shape (§4.3, §6.3). An unrecognized `type` is not an
//! error: the frame is silently ignored (§7 "unknown type").

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::error::ProtocolError;
use crate::room::Role;
use crate::ws::{ClientMessage, RawFrame};

/// Canonical room id shape (§6.3).
static ROOM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{4,12}$").expect("valid regex"));

/// Validate a canonical room id, per `ROOM_ID` (§6.3).
pub fn is_valid_room_id(room_id: &str) -> bool {
    ROOM_ID_RE.is_match(room_id)
}

fn require_room_id(raw: &RawFrame) -> Result<String, ProtocolError> {
    let room_id = raw
        .room_id
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or(ProtocolError::MissingField("roomId"))?;
    if !is_valid_room_id(&room_id) {
        return Err(ProtocolError::InvalidRoomId);
    }
    Ok(room_id)
}

fn require(field: Option<String>, name: &'static str) -> Result<String, ProtocolError> {
    field
        .filter(|s| !s.is_empty())
        .ok_or(ProtocolError::MissingField(name))
}

/// Validate a raw frame into a typed message, or `None` if its `type` is
/// not recognized (in which case it is dropped, not errored — §7).
pub fn validate(raw: RawFrame) -> Result<Option<ClientMessage>, ProtocolError> {
    let message = match raw.msg_type.as_str() {
        "register" => ClientMessage::Register {
            room_id: require_room_id(&raw)?,
            client_id: require(raw.client_id.clone(), "clientId")?,
            display_name: raw.display_name.clone(),
            role: Role::from_wire(raw.role.as_deref()),
        },
        "invite" => ClientMessage::Invite {
            room_id: require_room_id(&raw)?,
            from: require(raw.from.clone(), "from")?,
            to: require(raw.to.clone(), "to")?,
            payload: raw.payload.clone(),
        },
        "invite-response" => ClientMessage::InviteResponse {
            room_id: require_room_id(&raw)?,
            from: require(raw.from.clone(), "from")?,
            to: require(raw.to.clone(), "to")?,
            accepted: raw.accepted.ok_or(ProtocolError::MissingField("accepted"))?,
            invite_id: raw.invite_id.clone(),
        },
        "invite-cancel" => ClientMessage::InviteCancel {
            invite_id: require(raw.invite_id.clone(), "inviteId")?,
            from: require(raw.from.clone(), "from")?,
        },
        "signal" => ClientMessage::Signal {
            room_id: require_room_id(&raw)?,
            from: require(raw.from.clone(), "from")?,
            to: require(raw.to.clone(), "to")?,
            payload: raw.payload.clone().ok_or(ProtocolError::MissingField("payload"))?,
        },
        "play-command" => {
            let payload = raw.payload.clone().unwrap_or_else(|| json!({}));
            let command = payload
                .get("command")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or(ProtocolError::MissingField("payload.command"))?;
            ClientMessage::PlayCommand {
                room_id: require_room_id(&raw)?,
                from: require(raw.from.clone(), "from")?,
                command,
                timestamp: payload.get("timestamp").cloned(),
            }
        }
        "leave" => ClientMessage::Leave {
            room_id: require_room_id(&raw)?,
            from: require(raw.from.clone(), "from")?,
        },
        "ping" => ClientMessage::Ping,
        _ => return Ok(None),
    };

    Ok(Some(message))
}
