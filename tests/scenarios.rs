//! End-to-end scenarios, §8 "Scenarios" 1-6.

mod helpers;

use std::time::Duration;

use helpers::{invite_frame, invite_response_frame, raw_frame, register_frame, test_broker, TestClient};
use signalcast::room::Role;
use signalcast::ws::ServerMessage;

#[tokio::test]
async fn scenario_1_promotion() {
    let broker = test_broker(Duration::from_secs(20));
    let mut host = TestClient::new();
    let mut speaker = TestClient::new();

    host.send(&broker, register_frame("ROOM1", "H", Some("host")))
        .await
        .unwrap();
    assert!(matches!(host.next().await, ServerMessage::Registered { .. }));

    speaker
        .send(&broker, register_frame("ROOM1", "S", None))
        .await
        .unwrap();
    assert!(matches!(speaker.next().await, ServerMessage::Registered { .. }));
    assert!(matches!(
        host.next().await,
        ServerMessage::ClientsUpdated { .. }
    ));

    host.send(&broker, invite_frame("ROOM1", "H", "S"))
        .await
        .unwrap();

    let invite_id = match speaker.next().await {
        ServerMessage::Invite { invite_id, .. } => invite_id,
        other => panic!("expected Invite, got {other:?}"),
    };
    assert!(matches!(
        host.next().await,
        ServerMessage::InviteSent { .. }
    ));

    speaker
        .send(&broker, invite_response_frame("ROOM1", "S", "H", true))
        .await
        .unwrap();

    match host.next().await {
        ServerMessage::InviteResponse {
            invite_id: echoed,
            accepted,
            ..
        } => {
            assert_eq!(echoed, invite_id);
            assert!(accepted);
        }
        other => panic!("expected InviteResponse, got {other:?}"),
    }

    let roster_update = host.next().await;
    match roster_update {
        ServerMessage::ClientsUpdated { clients } => {
            let s = clients.iter().find(|c| c.client_id == "S").unwrap();
            assert_eq!(s.role, Role::Speaker);
        }
        other => panic!("expected ClientsUpdated, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_2_decline() {
    let broker = test_broker(Duration::from_secs(20));
    let mut host = TestClient::new();
    let mut speaker = TestClient::new();

    host.send(&broker, register_frame("ROOM1", "H", Some("host")))
        .await
        .unwrap();
    host.next().await;
    speaker
        .send(&broker, register_frame("ROOM1", "S", None))
        .await
        .unwrap();
    speaker.next().await;
    host.next().await; // clients-updated from S joining

    host.send(&broker, invite_frame("ROOM1", "H", "S"))
        .await
        .unwrap();
    speaker.next().await; // invite
    host.next().await; // invite-sent

    speaker
        .send(&broker, invite_response_frame("ROOM1", "S", "H", false))
        .await
        .unwrap();

    match host.next().await {
        ServerMessage::InviteResponse { accepted, .. } => assert!(!accepted),
        other => panic!("expected InviteResponse, got {other:?}"),
    }
    assert!(!host.has_pending(), "decline must not trigger clients-updated");
}

#[tokio::test]
async fn scenario_3_cancel() {
    let broker = test_broker(Duration::from_secs(20));
    let mut host = TestClient::new();
    let mut speaker = TestClient::new();

    host.send(&broker, register_frame("ROOM1", "H", Some("host")))
        .await
        .unwrap();
    host.next().await;
    speaker
        .send(&broker, register_frame("ROOM1", "S", None))
        .await
        .unwrap();
    speaker.next().await;
    host.next().await;

    host.send(&broker, invite_frame("ROOM1", "H", "S"))
        .await
        .unwrap();
    let invite_id = match speaker.next().await {
        ServerMessage::Invite { invite_id, .. } => invite_id,
        other => panic!("expected Invite, got {other:?}"),
    };
    host.next().await;

    let mut cancel = raw_frame("invite-cancel");
    cancel.invite_id = Some(invite_id.clone());
    cancel.from = Some("H".to_string());
    host.send(&broker, cancel).await.unwrap();

    match speaker.next().await {
        ServerMessage::InviteCancelled {
            invite_id: echoed, ..
        } => assert_eq!(echoed, invite_id),
        other => panic!("expected InviteCancelled, got {other:?}"),
    }

    // a later response for the same pair is now stale
    let err = speaker
        .send(
            &broker,
            invite_response_frame("ROOM1", "S", "H", true),
        )
        .await
        .unwrap_err();
    assert_eq!(err, signalcast::ProtocolError::NotInvited);
}

#[tokio::test]
async fn scenario_4_expiry() {
    let broker = test_broker(Duration::from_millis(30));
    let mut host = TestClient::new();
    let mut speaker = TestClient::new();

    host.send(&broker, register_frame("ROOM1", "H", Some("host")))
        .await
        .unwrap();
    host.next().await;
    speaker
        .send(&broker, register_frame("ROOM1", "S", None))
        .await
        .unwrap();
    speaker.next().await;
    host.next().await;

    host.send(&broker, invite_frame("ROOM1", "H", "S"))
        .await
        .unwrap();
    let invite_id = match speaker.next().await {
        ServerMessage::Invite { invite_id, .. } => invite_id,
        other => panic!("expected Invite, got {other:?}"),
    };
    host.next().await;

    tokio::time::sleep(Duration::from_millis(80)).await;

    match host.next().await {
        ServerMessage::InviteExpired {
            invite_id: echoed, ..
        } => assert_eq!(echoed, invite_id),
        other => panic!("expected InviteExpired at host, got {other:?}"),
    }
    match speaker.next().await {
        ServerMessage::InviteExpired {
            invite_id: echoed, ..
        } => assert_eq!(echoed, invite_id),
        other => panic!("expected InviteExpired at speaker, got {other:?}"),
    }

    assert!(broker.invites.by_id(&invite_id).await.is_none());
}

#[tokio::test]
async fn scenario_5_host_disconnect() {
    let broker = test_broker(Duration::from_secs(20));
    let mut host = TestClient::new();
    let mut speaker = TestClient::new();
    let mut idle = TestClient::new();

    host.send(&broker, register_frame("ROOM1", "H", Some("host")))
        .await
        .unwrap();
    host.next().await;
    speaker
        .send(&broker, register_frame("ROOM1", "S", None))
        .await
        .unwrap();
    speaker.next().await;
    host.next().await;
    idle.send(&broker, register_frame("ROOM1", "T", None))
        .await
        .unwrap();
    idle.next().await;
    host.next().await;
    speaker.next().await;

    host.send(&broker, invite_frame("ROOM1", "H", "S"))
        .await
        .unwrap();
    speaker.next().await;
    host.next().await;
    speaker
        .send(&broker, invite_response_frame("ROOM1", "S", "H", true))
        .await
        .unwrap();
    host.next().await; // invite-response
    host.next().await; // clients-updated
    speaker.next().await; // clients-updated
    idle.next().await; // clients-updated

    signalcast::router::handle_disconnect(&broker, "ROOM1", "H").await;

    assert!(matches!(
        speaker.next().await,
        ServerMessage::HostDisconnected { .. }
    ));
    assert!(matches!(
        idle.next().await,
        ServerMessage::HostDisconnected { .. }
    ));

    match speaker.next().await {
        ServerMessage::ClientsUpdated { clients } => {
            let s = clients.iter().find(|c| c.client_id == "S").unwrap();
            assert_eq!(s.role, Role::Idle);
            assert!(clients.iter().all(|c| c.client_id != "H"));
        }
        other => panic!("expected ClientsUpdated, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_6_signal_relay_is_pairwise() {
    let broker = test_broker(Duration::from_secs(20));
    let mut a = TestClient::new();
    let mut b = TestClient::new();
    let mut c = TestClient::new();

    a.send(&broker, register_frame("ROOM1", "A", None))
        .await
        .unwrap();
    a.next().await;
    b.send(&broker, register_frame("ROOM1", "B", None))
        .await
        .unwrap();
    b.next().await;
    a.next().await;
    c.send(&broker, register_frame("ROOM1", "C", None))
        .await
        .unwrap();
    c.next().await;
    a.next().await;
    b.next().await;

    let mut signal = raw_frame("signal");
    signal.room_id = Some("ROOM1".into());
    signal.from = Some("A".into());
    signal.to = Some("B".into());
    signal.payload = Some(serde_json::json!({"sdp": "offer"}));
    a.send(&broker, signal).await.unwrap();

    match b.next().await {
        ServerMessage::Signal { from, payload } => {
            assert_eq!(from, "A");
            assert_eq!(payload["sdp"], "offer");
        }
        other => panic!("expected Signal, got {other:?}"),
    }
    assert!(!c.has_pending(), "signal must not leak to a third party");
}

#[tokio::test]
async fn second_register_on_an_already_bound_connection_is_rejected() {
    let broker = test_broker(Duration::from_secs(20));
    let mut client = TestClient::new();

    client
        .send(&broker, register_frame("ROOM1", "A", None))
        .await
        .unwrap();
    client.next().await;

    let err = client
        .send(&broker, register_frame("ROOM2", "B", None))
        .await
        .unwrap_err();
    assert_eq!(err, signalcast::ProtocolError::AlreadyRegistered);

    // the original identity is still the room's sole member - no orphan, no
    // rebinding happened.
    let room = broker.rooms.get("ROOM1").await.unwrap();
    assert!(room.get("A").await.is_some());
    assert!(broker.rooms.get("ROOM2").await.is_none());
}
