//! Room Registry
//!
//! Source of truth for rooms, members, and roles (§3, §4.4). Each `Room`
//! keeps its own interior-mutable member map so that reads and cross-room
//! operations never contend with each other, mirroring the teacher server's
//! `Room { peers: RwLock<HashMap<...>> }` shape.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::names::random_animal_name;
use crate::ws::{RosterEntry, ServerMessage};

/// A member's role within a room (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Idle,
    Host,
    Speaker,
}

impl Role {
    /// Parse a wire-level role string, defaulting unknown/absent values to
    /// `idle` (§6.1: `role` optional, default `idle`).
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("host") => Self::Host,
            _ => Self::Idle,
        }
    }
}

/// A connected room member (§3).
#[derive(Clone)]
pub struct Member {
    pub client_id: String,
    pub display_name: String,
    pub role: Role,
    pub tx: mpsc::Sender<ServerMessage>,
}

/// Failure modes for delivering a frame to a specific member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// No member with that client id is in the room.
    NotFound,
    /// The member's outbound channel refused the frame.
    Unreachable,
}

/// A room: opaque id, membership, and the single-host invariant (§3 R1/R2).
pub struct Room {
    pub room_id: String,
    members: RwLock<HashMap<String, Member>>,
}

impl Room {
    fn new(room_id: String) -> Self {
        Self {
            room_id,
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or idempotently replace) a member (§4.4 `Register`).
    ///
    /// Displaced connections from an idempotent re-register are notified
    /// best-effort and otherwise left to discover their orphaned state when
    /// their next send fails — the registry does not own their socket.
    pub async fn register(
        &self,
        client_id: &str,
        declared_display_name: Option<String>,
        requested_role: Role,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Result<Member, crate::error::ProtocolError> {
        let mut members = self.members.write().await;

        if requested_role == Role::Host {
            if let Some(existing_host) = members.values().find(|m| m.role == Role::Host) {
                if existing_host.client_id != client_id {
                    return Err(crate::error::ProtocolError::DuplicateHost);
                }
            }
        }

        let base_name = declared_display_name
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| random_animal_name().to_string());
        let display_name = Self::resolve_unique_name(&members, client_id, &base_name);

        let member = Member {
            client_id: client_id.to_string(),
            display_name,
            role: requested_role,
            tx,
        };

        if let Some(displaced) = members.insert(client_id.to_string(), member.clone()) {
            debug!(client_id = %client_id, "idempotent re-register replaced existing member");
            let _ = displaced.tx.try_send(ServerMessage::Error {
                message: "Replaced by a new registration".to_string(),
            });
        }

        Ok(member)
    }

    /// Smallest integer >= 2 producing a room-unique name, per §4.4.
    fn resolve_unique_name(
        members: &HashMap<String, Member>,
        excluding_client: &str,
        base: &str,
    ) -> String {
        let taken: HashSet<&str> = members
            .values()
            .filter(|m| m.client_id != excluding_client)
            .map(|m| m.display_name.as_str())
            .collect();

        if !taken.contains(base) {
            return base.to_string();
        }

        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// The room's current host, if any (§4.4 `GetHost`).
    pub async fn get_host(&self) -> Option<Member> {
        self.members
            .read()
            .await
            .values()
            .find(|m| m.role == Role::Host)
            .cloned()
    }

    /// A single member by client id.
    pub async fn get(&self, client_id: &str) -> Option<Member> {
        self.members.read().await.get(client_id).cloned()
    }

    /// Update a member's role in place (e.g. promotion to speaker, or
    /// demotion to idle on host disconnect).
    pub async fn set_role(&self, client_id: &str, role: Role) {
        if let Some(member) = self.members.write().await.get_mut(client_id) {
            member.role = role;
        }
    }

    /// Demote every `speaker` in the room to `idle` (§4.8 step 2).
    pub async fn demote_all_speakers(&self) {
        for member in self.members.write().await.values_mut() {
            if member.role == Role::Speaker {
                member.role = Role::Idle;
            }
        }
    }

    /// Remove a member, returning it if present (§4.4 `Remove`).
    pub async fn remove(&self, client_id: &str) -> Option<Member> {
        self.members.write().await.remove(client_id)
    }

    /// Whether the room currently has no members (§3 R2).
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }

    /// A deterministic roster snapshot (§4.4 `RosterSnapshot`), sorted by
    /// client id so repeated calls over an unchanged room compare equal.
    pub async fn roster(&self) -> Vec<RosterEntry> {
        let members = self.members.read().await;
        let mut entries: Vec<RosterEntry> = members
            .values()
            .map(|m| RosterEntry {
                client_id: m.client_id.clone(),
                display_name: m.display_name.clone(),
                role: m.role,
            })
            .collect();
        entries.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        entries
    }

    /// Send a frame to exactly one member.
    pub async fn send_to(&self, client_id: &str, msg: ServerMessage) -> Result<(), SendError> {
        let tx = {
            let members = self.members.read().await;
            members.get(client_id).map(|m| m.tx.clone())
        };

        match tx {
            Some(tx) => tx.send(msg).await.map_err(|_| {
                let err = crate::error::BrokerError::Delivery(client_id.to_string());
                debug!(client_id = %client_id, error = %err, "send failed");
                SendError::Unreachable
            }),
            None => Err(SendError::NotFound),
        }
    }

    /// Broadcast to every member except one. Sender handles are cloned out
    /// from under the lock before any `send` is awaited, so a slow peer
    /// cannot stall the room's read path (§5 "write fan-out").
    pub async fn broadcast_except(&self, exclude_client_id: &str, msg: ServerMessage) {
        let senders: Vec<(String, mpsc::Sender<ServerMessage>)> = {
            let members = self.members.read().await;
            members
                .values()
                .filter(|m| m.client_id != exclude_client_id)
                .map(|m| (m.client_id.clone(), m.tx.clone()))
                .collect()
        };

        for (client_id, tx) in senders {
            if tx.send(msg.clone()).await.is_err() {
                let err = crate::error::BrokerError::Delivery(client_id.clone());
                debug!(client_id = %client_id, error = %err, "dropped broadcast to unreachable member");
            }
        }
    }

    /// Broadcast to every member, including the given one.
    pub async fn broadcast_all(&self, msg: ServerMessage) {
        let senders: Vec<(String, mpsc::Sender<ServerMessage>)> = {
            let members = self.members.read().await;
            members
                .values()
                .map(|m| (m.client_id.clone(), m.tx.clone()))
                .collect()
        };

        for (client_id, tx) in senders {
            if tx.send(msg.clone()).await.is_err() {
                let err = crate::error::BrokerError::Delivery(client_id.clone());
                debug!(client_id = %client_id, error = %err, "dropped broadcast to unreachable member");
            }
        }
    }
}

/// Process-wide registry of rooms (§4.4, §9 "Global state").
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Get a room, creating it if this is the first member to touch it.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(room_id) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Room::new(room_id.to_string())))
            .clone()
    }

    /// Get a room if it exists, without creating it.
    pub async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Drop a room from the registry if it is now empty (§3 R2).
    pub async fn remove_if_empty(&self, room_id: &str) {
        let room = self.rooms.read().await.get(room_id).cloned();
        if let Some(room) = room {
            if room.is_empty().await {
                self.rooms.write().await.remove(room_id);
                debug!(room_id = %room_id, "removed empty room");
            }
        }
    }

    /// Number of currently tracked rooms (used by tests).
    #[cfg(test)]
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
