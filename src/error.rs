//! Broker error types.
//!
//! `ProtocolError` is wire-facing: its `Display` text is exactly the human
//! string the validator/router places into an outbound `{type:"error",
//! message:...}` frame (§7). `BrokerError` covers internal failure modes that
//! never escape to a client directly.

use thiserror::Error;

/// Errors surfaced to the offending sender as `{type:"error", message:...}`.
///
/// None of these cause a disconnect; the connection remains usable (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound frame was not valid JSON.
    #[error("Invalid JSON")]
    InvalidJson,

    /// A required field was missing or empty for this message type.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// `roomId` did not match the canonical form (§6.3).
    #[error("Invalid room id")]
    InvalidRoomId,

    /// Sender attempted a host-only action without holding the host role.
    #[error("Only the host may perform this action")]
    NotHost,

    /// `invite-response` or `invite-cancel` came from a non-participant.
    #[error("No matching invite for this request")]
    NotInvited,

    /// Referenced room does not exist.
    #[error("Room not found")]
    RoomNotFound,

    /// Referenced target client is not a member of the room.
    #[error("Target client not found")]
    TargetNotFound,

    /// Target's outbound channel could not accept the frame.
    #[error("Target client is unreachable")]
    TargetUnreachable,

    /// `register` with `role: host` when a different host already holds the room.
    #[error("Room already has a host")]
    DuplicateHost,

    /// A connection attempted a room-scoped action before registering.
    #[error("Client must register before sending this message")]
    NotRegistered,

    /// A connection that already registered an identity sent another `register`.
    #[error("Connection is already registered; open a new connection to join as a different client")]
    AlreadyRegistered,

    /// Per-connection admission control rejected the frame (§4.2).
    #[error("Rate limit exceeded, please slow down")]
    RateLimitExceeded,
}

/// Internal failures that never reach a client verbatim.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Outbound delivery to a connection's write task failed (channel closed).
    #[error("failed to deliver frame to connection: {0}")]
    Delivery(String),

    /// A frame could not be serialized to JSON.
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
}
