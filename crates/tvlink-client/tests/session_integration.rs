//! End-to-end session tests against a scripted fake device.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tvlink_client::infrastructure::storage::credentials::{CredentialStore, MemoryStore, StoreError};
use tvlink_client::{ClientError, RemoteClient};
use tvlink_core::protocol::uris;
use tvlink_core::{DeviceCredential, MessageKind, SessionState};

use common::{
    closed_port, drain, error_reply, next_status, reply, test_config, wait_until, DeviceScript,
    FakeDevice, Reply, CLOSE, ECHO, FAIL, HOME_APP, PUSH,
};

const LOCAL: &str = "127.0.0.1";

fn client_for(device: &FakeDevice) -> (RemoteClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let client = RemoteClient::new(test_config(&[device.port]), store.clone());
    (client, store)
}

// ── Pairing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_pairing_with_registered_reaches_ready_without_persisting() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, store) = client_for(&device);
    let (tx, mut updates) = mpsc::unbounded_channel();
    client.set_status_listener(tx);

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert!(store.load().is_none(), "no credential issued, nothing persisted");

    let registers = device.received_of(MessageKind::Register);
    assert_eq!(registers.len(), 1);
    assert_eq!(registers[0].credential(), None);
    assert_eq!(registers[0].payload_str("pairingType"), Some("PROMPT"));

    let mut states: Vec<SessionState> = drain(&mut updates).iter().map(|s| s.session_state).collect();
    states.dedup();
    assert_eq!(
        &states[..3],
        &[SessionState::Connecting, SessionState::Pairing, SessionState::Ready]
    );
}

#[tokio::test]
async fn test_credential_in_plain_response_is_persisted() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::with_register(|msg| {
        vec![Reply::Send(reply(
            msg,
            MessageKind::Response,
            Some(json!({ "credential": "abc123" })),
        ))]
    }))
    .await;
    let (client, store) = client_for(&device);

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert_eq!(store.load(), Some(DeviceCredential::new(LOCAL, "abc123")));
}

#[tokio::test]
async fn test_prompt_notice_keeps_handshake_waiting_until_registered() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::with_register(|msg| {
        vec![
            Reply::Send(reply(
                msg,
                MessageKind::Response,
                Some(json!({ "pairingType": "PROMPT", "returnValue": true })),
            )),
            Reply::After(
                Duration::from_millis(150),
                reply(msg, MessageKind::Registered, Some(json!({ "credential": "k2" }))),
            ),
        ]
    }))
    .await;
    let (client, store) = client_for(&device);

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert_eq!(store.load().map(|r| r.credential), Some("k2".to_string()));
}

#[tokio::test]
async fn test_handshake_error_is_terminal_rejection() {
    // Arrange – a second, accepting device behind the rejecting one
    let rejecting = FakeDevice::start(DeviceScript::with_register(|msg| {
        vec![Reply::Send(error_reply(msg, "rejected"))]
    }))
    .await;
    let accepting = FakeDevice::start(DeviceScript::accepting()).await;
    let client = RemoteClient::new(
        test_config(&[rejecting.port, accepting.port]),
        Arc::new(MemoryStore::new()),
    );

    // Act
    let result = client.connect(LOCAL).await;

    // Assert
    match result {
        Err(ClientError::HandshakeRejected(reason)) => assert_eq!(reason, "rejected"),
        other => panic!("expected HandshakeRejected, got {other:?}"),
    }
    assert_eq!(client.status().session_state, SessionState::Disconnected);
    assert_eq!(accepting.accepted(), 0, "rejection must not try further endpoints");
}

#[tokio::test]
async fn test_unanswered_handshake_times_out_and_moves_on() {
    // Arrange
    let silent = FakeDevice::start(DeviceScript::with_register(|_| Vec::new())).await;
    let accepting = FakeDevice::start(DeviceScript::accepting()).await;
    let mut config = test_config(&[silent.port, accepting.port]);
    config.pairing_timeout_ms = 200;
    let client = RemoteClient::new(config, Arc::new(MemoryStore::new()));
    let (tx, mut updates) = mpsc::unbounded_channel();
    client.set_status_listener(tx);

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert – the second candidate is entered without passing through disconnected
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert_eq!(accepting.received_of(MessageKind::Register).len(), 1);
    let mut states: Vec<SessionState> = drain(&mut updates)
        .into_iter()
        .map(|snapshot| snapshot.session_state)
        .collect();
    states.dedup();
    assert_eq!(
        states,
        [
            SessionState::Connecting,
            SessionState::Pairing,
            SessionState::Connecting,
            SessionState::Pairing,
            SessionState::Ready,
        ]
    );
}

#[tokio::test]
async fn test_save_failure_does_not_fail_connection() {
    struct ReadOnlyStore;

    impl CredentialStore for ReadOnlyStore {
        fn load(&self) -> Option<DeviceCredential> {
            None
        }

        fn save(&self, _record: &DeviceCredential) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "/read-only/credentials.json".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }

    // Arrange
    let device = FakeDevice::start(DeviceScript::issuing("abc123")).await;
    let client = RemoteClient::new(test_config(&[device.port]), Arc::new(ReadOnlyStore));

    // Act
    let result = client.connect(LOCAL).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(client.status().session_state, SessionState::Ready);
}

#[tokio::test]
async fn test_unsaved_credential_wins_over_older_stored_one() {
    struct StaleStore;

    impl CredentialStore for StaleStore {
        fn load(&self) -> Option<DeviceCredential> {
            Some(DeviceCredential::new(LOCAL, "k-old"))
        }

        fn save(&self, _record: &DeviceCredential) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: "/read-only/credentials.json".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }

    // Arrange
    let device = FakeDevice::start(DeviceScript::issuing("k-new")).await;
    let client = RemoteClient::new(test_config(&[device.port]), Arc::new(StaleStore));

    // Act
    client.connect(LOCAL).await.unwrap();
    client.disconnect().await;
    client.connect(LOCAL).await.unwrap();

    // Assert
    let registers = device.received_of(MessageKind::Register);
    assert_eq!(registers[0].credential(), Some("k-old"));
    assert_eq!(registers[1].credential(), Some("k-new"));
}

// ── Endpoint selection ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_all_three_endpoints_failing_lists_three_attempts() {
    // Arrange
    let ports = [closed_port().await, closed_port().await, closed_port().await];
    let client = RemoteClient::new(test_config(&ports), Arc::new(MemoryStore::new()));

    // Act
    let result = client.connect(LOCAL).await;

    // Assert
    match result {
        Err(ClientError::AllEndpointsFailed { attempts }) => {
            assert_eq!(attempts.len(), 3);
            for (attempt, port) in attempts.iter().zip(ports) {
                assert_eq!(attempt.endpoint, format!("ws://127.0.0.1:{port}"));
                assert!(!attempt.reason.is_empty());
            }
        }
        other => panic!("expected AllEndpointsFailed, got {other:?}"),
    }
    let status = client.status();
    assert_eq!(status.session_state, SessionState::Disconnected);
}

#[tokio::test]
async fn test_closed_first_endpoint_falls_through_to_next() {
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let client = RemoteClient::new(
        test_config(&[closed_port().await, device.port]),
        Arc::new(MemoryStore::new()),
    );

    client.connect(LOCAL).await.unwrap();

    assert_eq!(client.status().session_state, SessionState::Ready);
}

// ── Credential matching ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_stored_credential_only_sent_to_issuing_address() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let store = Arc::new(MemoryStore::with_record(DeviceCredential::new(LOCAL, "k-a")));
    let client = RemoteClient::new(test_config(&[device.port]), store);

    // Act – same device, reached once by the issuing address and once by another name
    client.connect(LOCAL).await.unwrap();
    client.connect("localhost").await.unwrap();

    // Assert
    let registers = device.received_of(MessageKind::Register);
    assert_eq!(registers.len(), 2);
    assert_eq!(registers[0].credential(), Some("k-a"));
    assert_eq!(registers[1].credential(), None);
}

#[tokio::test]
async fn test_issued_credential_is_reused_on_reconnect() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::issuing("fresh")).await;
    let (client, _store) = client_for(&device);

    // Act
    client.connect(LOCAL).await.unwrap();
    client.disconnect().await;
    client.connect(LOCAL).await.unwrap();

    // Assert
    let registers = device.received_of(MessageKind::Register);
    assert_eq!(registers[0].credential(), None);
    assert_eq!(registers[1].credential(), Some("fresh"));
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_twice_is_idempotent() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    // Act
    client.disconnect().await;
    client.disconnect().await;

    // Assert
    let status = client.status();
    assert_eq!(status.session_state, SessionState::Disconnected);
    assert!(status.device_address.is_none());
    assert!(status.volume.is_none() && status.foreground_app.is_none());
    assert!(matches!(client.press_key("HOME").await, Err(ClientError::NotConnected)));
    assert!(wait_until(Duration::from_secs(2), || device.open_connections() == 0).await);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_starts_clean() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();
    client.disconnect().await;

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert
    assert_eq!(device.accepted(), 2);
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert_eq!(device.received_of(MessageKind::Subscribe).len(), 4);
    let answer = client.request(ECHO, Some(json!({ "n": 1 }))).await.unwrap();
    assert_eq!(answer.payload, Some(json!({ "n": 1 })));
}

#[tokio::test]
async fn test_connect_while_connected_replaces_session() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert
    assert_eq!(device.accepted(), 2);
    assert!(wait_until(Duration::from_secs(2), || device.open_connections() == 1).await);
    assert_eq!(client.status().session_state, SessionState::Ready);
}

#[tokio::test]
async fn test_disconnect_interrupts_pairing() {
    // Arrange – the device only answers the register message after 2s
    let device = FakeDevice::start(DeviceScript::with_register(|msg| {
        vec![Reply::After(
            Duration::from_secs(2),
            reply(msg, MessageKind::Registered, None),
        )]
    }))
    .await;
    let (client, _store) = client_for(&device);
    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect(LOCAL).await })
    };
    let observer = client.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            observer.status().session_state == SessionState::Pairing
        })
        .await
    );

    // Act
    let started = Instant::now();
    client.disconnect().await;
    let took = started.elapsed();

    // Assert
    assert!(took < Duration::from_secs(1), "disconnect waited {took:?} for pairing");
    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(ClientError::NotConnected)), "got {result:?}");
    time::sleep(Duration::from_millis(2200)).await;
    let status = client.status();
    assert_eq!(status.session_state, SessionState::Disconnected);
    assert!(status.device_address.is_none());
    assert!(wait_until(Duration::from_secs(2), || device.open_connections() == 0).await);
}

#[tokio::test]
async fn test_second_connect_supersedes_one_still_pairing() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::with_register(|msg| {
        vec![Reply::After(
            Duration::from_millis(800),
            reply(msg, MessageKind::Registered, None),
        )]
    }))
    .await;
    let (client, _store) = client_for(&device);
    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.connect(LOCAL).await })
    };
    let observer = client.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            observer.status().session_state == SessionState::Pairing
        })
        .await
    );

    // Act
    let second = client.connect(LOCAL).await;

    // Assert
    assert!(second.is_ok());
    assert!(matches!(first.await.unwrap(), Err(ClientError::NotConnected)));
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert!(wait_until(Duration::from_secs(2), || device.open_connections() == 1).await);
}

#[tokio::test]
async fn test_device_closing_socket_drives_disconnected() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    // Act
    let in_flight = client.request(CLOSE, None).await;

    // Assert
    assert!(matches!(in_flight, Err(ClientError::NotConnected)));
    let observer = client.clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            observer.status().session_state == SessionState::Disconnected
        })
        .await
    );
    assert_eq!(client.status().device_address.as_deref(), Some(LOCAL));
    assert!(matches!(client.send_text("x").await, Err(ClientError::NotConnected)));
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_press_key_and_send_text_payloads() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    // Act
    client.press_key("home").await.unwrap();
    client.send_text("hello").await.unwrap();

    // Assert
    let buttons = device.requests_to(uris::SEND_BUTTON);
    assert_eq!(buttons[0].payload, Some(json!({ "name": "HOME" })));
    let texts = device.requests_to(uris::INSERT_TEXT);
    assert_eq!(texts[0].payload, Some(json!({ "text": "hello", "replace": 0 })));
}

#[tokio::test]
async fn test_invalid_button_sends_nothing() {
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    let result = client.press_key("VOLUME UP").await;

    assert!(matches!(result, Err(ClientError::InvalidCommand(_))));
    assert!(device.requests_to(uris::SEND_BUTTON).is_empty());
}

#[tokio::test]
async fn test_device_error_answer_surfaces_text() {
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    let result = client.request(FAIL, None).await;

    match result {
        Err(ClientError::Device(text)) => assert_eq!(text, "denied"),
        other => panic!("expected Device error, got {other:?}"),
    }
    assert_eq!(client.status().session_state, SessionState::Ready);
}

#[tokio::test]
async fn test_concurrent_requests_resolve_with_their_own_answers() {
    // Arrange – later requests are answered first
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    client.connect(LOCAL).await.unwrap();

    // Act
    let calls = (0..10u64).map(|n| {
        let client = client.clone();
        async move {
            let payload = json!({ "n": n, "delayMs": (10 - n) * 20 });
            (n, client.request(ECHO, Some(payload)).await)
        }
    });
    let results = join_all(calls).await;

    // Assert
    for (n, result) in results {
        let answer = result.unwrap();
        assert_eq!(answer.payload.unwrap()["n"], json!(n));
    }
    let ids: std::collections::HashSet<_> = device
        .requests_to(ECHO)
        .into_iter()
        .filter_map(|m| m.id)
        .collect();
    assert_eq!(ids.len(), 10, "every request gets a distinct id");
}

#[tokio::test]
async fn test_request_timeout_then_late_answer_is_ignored() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let mut config = test_config(&[device.port]);
    config.request_timeout_ms = 150;
    let client = RemoteClient::new(config, Arc::new(MemoryStore::new()));
    client.connect(LOCAL).await.unwrap();

    // Act
    let slow = client.request(ECHO, Some(json!({ "n": 1, "delayMs": 400 }))).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    let fresh = client.request(ECHO, Some(json!({ "n": 2 }))).await;

    // Assert
    assert!(matches!(slow, Err(ClientError::RequestTimeout { .. })));
    assert_eq!(client.status().session_state, SessionState::Ready);
    assert_eq!(fresh.unwrap().payload, Some(json!({ "n": 2 })));
}

// ── Status ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_default_subscriptions_populate_status() {
    // Arrange
    let device = FakeDevice::start(
        DeviceScript::accepting().with_volume_update(Duration::from_millis(100), json!({ "volume": 11 })),
    )
    .await;
    let (client, _store) = client_for(&device);
    let (tx, mut updates) = mpsc::unbounded_channel();
    client.set_status_listener(tx);

    // Act
    client.connect(LOCAL).await.unwrap();

    // Assert
    let home = next_status(&mut updates, |s| s.foreground_app.as_deref() == Some(HOME_APP)).await;
    assert!(home.is_some());
    let louder = next_status(&mut updates, |s| s.volume == Some(11)).await.unwrap();
    assert_eq!(louder.muted, Some(false), "partial update keeps mute state");
    assert_eq!(louder.session_state, SessionState::Ready);

    let subscribed: Vec<_> = device
        .received_of(MessageKind::Subscribe)
        .into_iter()
        .filter_map(|m| m.uri)
        .collect();
    assert!(subscribed.contains(&uris::FOREGROUND_APP.to_string()));
    assert!(subscribed.contains(&uris::VOLUME.to_string()));
}

#[tokio::test]
async fn test_unsolicited_message_updates_status() {
    // Arrange
    let device = FakeDevice::start(DeviceScript::accepting()).await;
    let (client, _store) = client_for(&device);
    let (tx, mut updates) = mpsc::unbounded_channel();
    client.set_status_listener(tx);
    client.connect(LOCAL).await.unwrap();

    // Act
    client.request(PUSH, Some(json!({ "appId": "netflix" }))).await.unwrap();

    // Assert
    let snapshot = next_status(&mut updates, |s| s.foreground_app.as_deref() == Some("netflix")).await;
    assert!(snapshot.is_some());
}
