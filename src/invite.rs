//! Invite Ledger
//!
//! Time-bounded offers from a room's host promoting an idle member to
//! speaker (§3, §4.5). Each invite owns a cancellable deadline task so that
//! a terminal transition (response, cancel, disconnect) never races a later
//! expiry firing for the same id (§9 "Invite timer handles").

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use tokio::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::room::RoomRegistry;
use crate::ws::ServerMessage;

/// A live invite record (§3).
#[derive(Debug, Clone)]
pub struct Invite {
    pub invite_id: String,
    pub room_id: String,
    /// The host who issued the invite.
    pub from: String,
    /// The idle member being invited to speak.
    pub to: String,
    pub payload: Value,
}

struct Record {
    invite: Invite,
    cancel_tx: Option<oneshot::Sender<()>>,
    expires_at: Instant,
}

/// Process-wide ledger of live invites (§4.5, §9 "Global state").
pub struct InviteLedger {
    records: RwLock<HashMap<String, Record>>,
    timeout: Duration,
}

impl InviteLedger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Mint an invite, store it, and schedule its deadline handler. Returns
    /// the new invite id. `self` must be held behind an `Arc` so the
    /// spawned deadline task can hold its own handle.
    ///
    /// At most one invite from a given `from`->`to` pair may be live at a
    /// time (§3 I3): any existing live invite for this `(room_id, from, to)`
    /// is superseded — removed and its deadline handler cancelled — before
    /// the new one is minted, so a stale record can never later win the
    /// `by_pair` lookup or re-fire as an orphaned expiry.
    pub async fn create(
        self: &Arc<Self>,
        rooms: Arc<RoomRegistry>,
        room_id: String,
        from: String,
        to: String,
        payload: Value,
    ) -> String {
        if let Some(existing) = self.by_pair(&room_id, &from, &to).await {
            self.remove(&existing.invite_id).await;
        }

        let invite_id = Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let expires_at = Instant::now() + self.timeout;

        let invite = Invite {
            invite_id: invite_id.clone(),
            room_id,
            from,
            to,
            payload,
        };

        self.records.write().await.insert(
            invite_id.clone(),
            Record {
                invite,
                cancel_tx: Some(cancel_tx),
                expires_at,
            },
        );

        let ledger = self.clone();
        let id_for_task = invite_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(expires_at) => {
                    ledger.fire_expiry(&rooms, &id_for_task).await;
                }
                _ = cancel_rx => {
                    debug!(invite_id = %id_for_task, "invite deadline cancelled");
                }
            }
        });

        invite_id
    }

    /// Look up the live invite matching a (room, host, target) triple, used
    /// to resolve `invite-response` (§4.5 `ByPair`).
    pub async fn by_pair(&self, room_id: &str, from: &str, to: &str) -> Option<Invite> {
        self.records
            .read()
            .await
            .values()
            .map(|r| &r.invite)
            .find(|i| i.room_id == room_id && i.from == from && i.to == to)
            .cloned()
    }

    /// Look up a live invite by id (§4.5 `ById`).
    pub async fn by_id(&self, invite_id: &str) -> Option<Invite> {
        self.records
            .read()
            .await
            .get(invite_id)
            .map(|r| r.invite.clone())
    }

    /// Remove an invite, cancelling its deadline handler so it cannot later
    /// re-fire as an expiry (§4.5 `Remove`, §9).
    pub async fn remove(&self, invite_id: &str) -> Option<Invite> {
        self.records.write().await.remove(invite_id).map(|r| {
            if let Some(tx) = r.cancel_tx {
                let _ = tx.send(());
            }
            r.invite
        })
    }

    /// Remove every invite touching a disconnected client, for the
    /// disconnect cascade (§4.8 step 3). Returns the removed invites so the
    /// caller can notify the other side of each.
    pub async fn remove_for_client(&self, client_id: &str) -> Vec<Invite> {
        let mut records = self.records.write().await;
        let matching: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.invite.from == client_id || r.invite.to == client_id)
            .map(|(id, _)| id.clone())
            .collect();

        let mut removed = Vec::with_capacity(matching.len());
        for id in matching {
            if let Some(r) = records.remove(&id) {
                if let Some(tx) = r.cancel_tx {
                    let _ = tx.send(());
                }
                removed.push(r.invite);
            }
        }
        removed
    }

    /// Periodic fallback sweep for expired invites whose deadline task was
    /// somehow lost (§4.5 `SweepExpired`, §9 "periodic sweep is a safety
    /// net, not the primary mechanism").
    pub async fn sweep_expired(&self, rooms: &Arc<RoomRegistry>) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .records
            .read()
            .await
            .iter()
            .filter(|(_, r)| r.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for invite_id in expired {
            self.fire_expiry(rooms, &invite_id).await;
        }
    }

    async fn fire_expiry(&self, rooms: &Arc<RoomRegistry>, invite_id: &str) {
        let Some(invite) = self.remove(invite_id).await else {
            return;
        };
        let Some(room) = rooms.get(&invite.room_id).await else {
            return;
        };

        let _ = room
            .send_to(
                &invite.from,
                ServerMessage::InviteExpired {
                    invite_id: invite.invite_id.clone(),
                    to: Some(invite.to.clone()),
                    from: None,
                    reason: None,
                },
            )
            .await;
        let _ = room
            .send_to(
                &invite.to,
                ServerMessage::InviteExpired {
                    invite_id: invite.invite_id.clone(),
                    to: None,
                    from: Some(invite.from.clone()),
                    reason: None,
                },
            )
            .await;
    }
}
