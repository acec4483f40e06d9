//! Shared scaffolding for router-level integration tests.
//!
//! Mirrors the teacher's `voice/ws_handler_test.rs` approach of driving
//! handlers directly rather than opening a real socket: each simulated
//! connection is a plain `(Sender, Receiver)` pair standing in for a
//! socket's outbound half.

use std::sync::Arc;
use std::time::Duration;

use signalcast::config::Config;
use signalcast::invite::InviteLedger;
use signalcast::room::RoomRegistry;
use signalcast::router::{self, SessionView};
use signalcast::ws::{Broker, RawFrame, ServerMessage};
use tokio::sync::mpsc;

pub struct TestClient {
    pub tx: mpsc::Sender<ServerMessage>,
    pub rx: mpsc::Receiver<ServerMessage>,
    pub session: SessionView,
}

impl TestClient {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self {
            tx,
            rx,
            session: SessionView {
                room_id: None,
                client_id: None,
            },
        }
    }

    /// Dispatch one frame as this client, updating its bound identity on a
    /// successful `register`.
    pub async fn send(&mut self, broker: &Broker, frame: RawFrame) -> Result<(), signalcast::ProtocolError> {
        match router::dispatch(broker, self.session.clone(), frame, &self.tx).await? {
            Some(bound) => {
                self.session = SessionView {
                    room_id: Some(bound.room_id),
                    client_id: Some(bound.client_id),
                };
            }
            None => {}
        }
        Ok(())
    }

    /// Drain the next outbound frame, panicking if none arrived.
    pub async fn next(&mut self) -> ServerMessage {
        self.rx
            .try_recv()
            .unwrap_or_else(|_| panic!("expected an outbound frame but none arrived"))
    }

    pub fn has_pending(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

pub fn test_broker(invite_timeout: Duration) -> Broker {
    Broker {
        rooms: Arc::new(RoomRegistry::new()),
        invites: Arc::new(InviteLedger::new(invite_timeout)),
        config: Arc::new(Config::default_for_test()),
    }
}

pub fn raw_frame(msg_type: &str) -> RawFrame {
    RawFrame {
        msg_type: msg_type.to_string(),
        room_id: None,
        client_id: None,
        display_name: None,
        role: None,
        from: None,
        to: None,
        invite_id: None,
        accepted: None,
        payload: None,
    }
}

pub fn register_frame(room_id: &str, client_id: &str, role: Option<&str>) -> RawFrame {
    let mut frame = raw_frame("register");
    frame.room_id = Some(room_id.to_string());
    frame.client_id = Some(client_id.to_string());
    frame.role = role.map(str::to_string);
    frame
}

pub fn invite_frame(room_id: &str, from: &str, to: &str) -> RawFrame {
    let mut frame = raw_frame("invite");
    frame.room_id = Some(room_id.to_string());
    frame.from = Some(from.to_string());
    frame.to = Some(to.to_string());
    frame
}

pub fn invite_response_frame(room_id: &str, from: &str, to: &str, accepted: bool) -> RawFrame {
    let mut frame = raw_frame("invite-response");
    frame.room_id = Some(room_id.to_string());
    frame.from = Some(from.to_string());
    frame.to = Some(to.to_string());
    frame.accepted = Some(accepted);
    frame
}
