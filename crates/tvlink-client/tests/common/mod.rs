//! Shared fixtures for the client integration tests.
//!
//! [`FakeDevice`] is a local WebSocket server that speaks the main-channel
//! protocol from a [`DeviceScript`]; [`FakePointer`] is a pointer socket that
//! records every binary frame it receives.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tvlink_client::infrastructure::storage::config::ClientConfig;
use tvlink_core::protocol::uris;
use tvlink_core::{decode_text, encode_text, EndpointTemplate, MessageKind, Scheme, StatusSnapshot, WireMessage};

/// Test-only URI: answered with the request payload after `payload.delayMs`.
pub const ECHO: &str = "ssap://test/echo";
/// Test-only URI: the device closes the socket instead of answering.
pub const CLOSE: &str = "ssap://test/close";
/// Test-only URI: answered with an `error` message.
pub const FAIL: &str = "ssap://test/fail";
/// Test-only URI: the device pushes the payload as an unsolicited message.
pub const PUSH: &str = "ssap://test/push";

pub const HOME_APP: &str = "com.webos.app.home";

/// One scripted action in answer to an inbound message.
pub enum Reply {
    Send(WireMessage),
    After(Duration, WireMessage),
    Close,
}

type RegisterFn = Arc<dyn Fn(&WireMessage) -> Vec<Reply> + Send + Sync>;

/// How the fake device answers.
#[derive(Clone)]
pub struct DeviceScript {
    register: RegisterFn,
    pointer_url: Option<String>,
    volume_updates: Vec<(Duration, Value)>,
}

impl DeviceScript {
    /// Accepts pairing with `registered` and no credential.
    pub fn accepting() -> Self {
        Self::with_register(|msg| vec![Reply::Send(reply(msg, MessageKind::Registered, None))])
    }

    /// Accepts pairing with `registered` carrying `credential`.
    pub fn issuing(credential: &'static str) -> Self {
        Self::with_register(move |msg| {
            vec![Reply::Send(reply(
                msg,
                MessageKind::Registered,
                Some(json!({ "credential": credential })),
            ))]
        })
    }

    pub fn with_register(register: impl Fn(&WireMessage) -> Vec<Reply> + Send + Sync + 'static) -> Self {
        Self {
            register: Arc::new(register),
            pointer_url: None,
            volume_updates: Vec::new(),
        }
    }

    /// Hands out `url` as the pointer socket.
    pub fn with_pointer(mut self, url: &str) -> Self {
        self.pointer_url = Some(url.to_string());
        self
    }

    /// Pushes `payload` on the volume subscription `delay` after subscribing.
    pub fn with_volume_update(mut self, delay: Duration, payload: Value) -> Self {
        self.volume_updates.push((delay, payload));
        self
    }

    fn respond(&self, msg: &WireMessage) -> Vec<Reply> {
        match msg.kind {
            MessageKind::Register => (self.register)(msg),
            MessageKind::Subscribe => match msg.uri.as_deref() {
                Some(uris::FOREGROUND_APP) => vec![Reply::Send(reply(
                    msg,
                    MessageKind::Response,
                    Some(json!({ "appId": HOME_APP })),
                ))],
                Some(uris::VOLUME) => {
                    let mut replies = vec![Reply::Send(reply(
                        msg,
                        MessageKind::Response,
                        Some(json!({ "volume": 10, "muted": false })),
                    ))];
                    for (delay, payload) in &self.volume_updates {
                        replies.push(Reply::After(
                            *delay,
                            reply(msg, MessageKind::Response, Some(payload.clone())),
                        ));
                    }
                    replies
                }
                _ => vec![Reply::Send(error_reply(msg, "unknown subscription"))],
            },
            MessageKind::Request => match msg.uri.as_deref() {
                Some(uris::POINTER_SOCKET) => match &self.pointer_url {
                    Some(url) => vec![Reply::Send(reply(
                        msg,
                        MessageKind::Response,
                        Some(json!({ "socketPath": url })),
                    ))],
                    None => vec![Reply::Send(error_reply(msg, "pointer input unsupported"))],
                },
                Some(ECHO) => {
                    let delay = msg
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("delayMs"))
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    vec![Reply::After(
                        Duration::from_millis(delay),
                        reply(msg, MessageKind::Response, msg.payload.clone()),
                    )]
                }
                Some(CLOSE) => vec![Reply::Close],
                Some(FAIL) => vec![Reply::Send(error_reply(msg, "denied"))],
                Some(PUSH) => vec![
                    Reply::Send(reply(msg, MessageKind::Response, Some(json!({ "returnValue": true })))),
                    Reply::Send(WireMessage {
                        kind: MessageKind::Response,
                        id: None,
                        uri: None,
                        payload: msg.payload.clone(),
                        error: None,
                    }),
                ],
                _ => vec![Reply::Send(reply(
                    msg,
                    MessageKind::Response,
                    Some(json!({ "returnValue": true })),
                ))],
            },
            _ => Vec::new(),
        }
    }
}

/// An answer to `to` carrying the same id.
pub fn reply(to: &WireMessage, kind: MessageKind, payload: Option<Value>) -> WireMessage {
    WireMessage {
        kind,
        id: to.id.clone(),
        uri: None,
        payload,
        error: None,
    }
}

/// An `error` answer to `to`.
pub fn error_reply(to: &WireMessage, text: &str) -> WireMessage {
    WireMessage {
        kind: MessageKind::Error,
        id: to.id.clone(),
        uri: None,
        payload: None,
        error: Some(text.to_string()),
    }
}

// ── Fake device ───────────────────────────────────────────────────────────────

pub struct FakeDevice {
    pub port: u16,
    received: Arc<Mutex<Vec<WireMessage>>>,
    accepted: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub async fn start(script: DeviceScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let open = Arc::new(AtomicUsize::new(0));

        let (r, a, o) = (Arc::clone(&received), Arc::clone(&accepted), Arc::clone(&open));
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(
                    socket,
                    script.clone(),
                    Arc::clone(&r),
                    Arc::clone(&a),
                    Arc::clone(&o),
                ));
            }
        });

        Self {
            port,
            received,
            accepted,
            open,
        }
    }

    pub fn endpoint(&self) -> EndpointTemplate {
        EndpointTemplate::new(Scheme::Ws, self.port)
    }

    /// Every message received so far, across all connections.
    pub fn received(&self) -> Vec<WireMessage> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_of(&self, kind: MessageKind) -> Vec<WireMessage> {
        self.received().into_iter().filter(|m| m.kind == kind).collect()
    }

    pub fn requests_to(&self, uri: &str) -> Vec<WireMessage> {
        self.received()
            .into_iter()
            .filter(|m| m.uri.as_deref() == Some(uri))
            .collect()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

async fn serve(
    socket: TcpStream,
    script: DeviceScript,
    received: Arc<Mutex<Vec<WireMessage>>>,
    accepted: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
) {
    let Ok(ws) = accept_async(socket).await else {
        return;
    };
    accepted.fetch_add(1, Ordering::SeqCst);
    open.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = source.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let msg = decode_text(&text).unwrap();
        received.lock().unwrap().push(msg.clone());

        for action in script.respond(&msg) {
            match action {
                Reply::Send(answer) => {
                    let _ = tx.send(Message::Text(encode_text(&answer).unwrap()));
                }
                Reply::After(delay, answer) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        time::sleep(delay).await;
                        let _ = tx.send(Message::Text(encode_text(&answer).unwrap()));
                    });
                }
                Reply::Close => {
                    let _ = tx.send(Message::Close(None));
                }
            }
        }
    }

    writer.abort();
    open.fetch_sub(1, Ordering::SeqCst);
}

// ── Fake pointer socket ───────────────────────────────────────────────────────

pub struct FakePointer {
    pub url: String,
    frames: Arc<Mutex<Vec<(Instant, Vec<u8>)>>>,
}

impl FakePointer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/resources/pointer", listener.local_addr().unwrap());
        let frames = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&frames);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(socket).await else {
                        return;
                    };
                    while let Some(Ok(frame)) = ws.next().await {
                        if let Message::Binary(bytes) = frame {
                            sink.lock().unwrap().push((Instant::now(), bytes));
                        }
                    }
                });
            }
        });

        Self { url, frames }
    }

    /// Frames received so far.
    pub fn frames(&self) -> Vec<(Instant, Vec<u8>)> {
        self.frames.lock().unwrap().clone()
    }

    /// Waits until at least `count` frames arrived, then returns them all.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<(Instant, Vec<u8>)> {
        let frames = Arc::clone(&self.frames);
        wait_until(Duration::from_secs(3), || frames.lock().unwrap().len() >= count).await;
        self.frames.lock().unwrap().clone()
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Config with plain `ws` endpoints on `ports` and short timeouts.
pub fn test_config(ports: &[u16]) -> ClientConfig {
    ClientConfig {
        endpoints: ports
            .iter()
            .map(|&port| EndpointTemplate::new(Scheme::Ws, port))
            .collect(),
        connect_timeout_ms: 2_000,
        request_timeout_ms: 1_000,
        pairing_timeout_ms: 2_000,
        click_release_delay_ms: 30,
        ..ClientConfig::default()
    }
}

/// A local port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Polls `condition` every 10 ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receives snapshots until one satisfies `predicate`.
pub async fn next_status(
    updates: &mut mpsc::UnboundedReceiver<StatusSnapshot>,
    predicate: impl Fn(&StatusSnapshot) -> bool,
) -> Option<StatusSnapshot> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        match time::timeout_at(deadline, updates.recv()).await {
            Ok(Some(snapshot)) if predicate(&snapshot) => return Some(snapshot),
            Ok(Some(_)) => continue,
            _ => return None,
        }
    }
}

/// Drains every snapshot currently queued.
pub fn drain(updates: &mut mpsc::UnboundedReceiver<StatusSnapshot>) -> Vec<StatusSnapshot> {
    let mut all = Vec::new();
    while let Ok(snapshot) = updates.try_recv() {
        all.push(snapshot);
    }
    all
}
