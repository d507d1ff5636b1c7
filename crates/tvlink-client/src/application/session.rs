//! The session client.
//!
//! [`RemoteClient`] is the one object a presentation layer talks to.  It is
//! cheap to clone (all clones share one connection) and every method takes
//! `&self`, so commands can be issued concurrently from many tasks.
//!
//! # Connection lifecycle
//!
//! ```text
//! disconnected --connect--> connecting --socket open--> pairing --accepted--> ready
//!       ^                        |                         |                    |
//!       +------------------------+-------------------------+--------------------+
//!                 every candidate failed / rejected / disconnect / socket lost
//! ```
//!
//! `connect` and `disconnect` are serialized by a lifecycle lock; commands
//! do not take it and only check that the session is `ready`.  Before
//! waiting for the lock, both bump an interrupt counter: a `connect` still
//! working through its candidates sees the bump, abandons the attempt in
//! flight, and returns [`ClientError::NotConnected`].
//!
//! # Connecting
//!
//! Candidate endpoints are tried in order.  For each one the transport is
//! opened with its own timeout and the handshake runs with the (longer)
//! pairing timeout.  A transport failure or handshake timeout moves on to
//! the next candidate; an explicit rejection stops immediately.  When every
//! candidate fails, the caller gets one error listing all attempts.
//!
//! Once paired, the default subscriptions are sent and the pointer channel
//! is opened in the background.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use tvlink_core::domain::endpoint::candidates;
use tvlink_core::protocol::{uris, HandshakePayload};
use tvlink_core::{
    ButtonName, Endpoint, MessageKind, PointerButton, PointerEvent, SessionState, StatusSnapshot,
    WireMessage,
};

use super::handshake::{self, CachedCredential, HandshakeError};
use super::status::StatusAggregator;
use crate::error::{ClientError, EndpointFailure};
use crate::infrastructure::network::channel::{ChannelHooks, MainChannel};
use crate::infrastructure::network::pointer::{PointerChannel, PointerChannelError, PointerState};
use crate::infrastructure::network::transport;
use crate::infrastructure::storage::config::ClientConfig;
use crate::infrastructure::storage::credentials::CredentialStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the device session.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<Connection>,
}

/// Connection state shared by every clone of a [`RemoteClient`].
///
/// Created once and reused across reconnects: fields are reset on
/// disconnect, never reallocated.
struct Connection {
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    lifecycle: tokio::sync::Mutex<()>,
    channel: Arc<MainChannel>,
    pointer: Arc<PointerChannel>,
    status: Arc<StatusAggregator>,
    credential: Mutex<Option<CachedCredential>>,
    /// Bumped by every `connect` and `disconnect` call.
    interrupts: watch::Sender<u64>,
    pointer_task: Mutex<Option<JoinHandle<()>>>,
}

/// How one candidate endpoint failed.
enum AttemptError {
    /// Try the next candidate.
    Failed(String),
    /// Stop trying; the device said no.
    Rejected(String),
    /// A newer `connect` or `disconnect` was requested.
    Interrupted,
}

impl RemoteClient {
    /// Creates a disconnected client.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner: Arc::new(Connection {
                config,
                store,
                lifecycle: tokio::sync::Mutex::new(()),
                channel: Arc::new(MainChannel::new()),
                pointer: Arc::new(PointerChannel::new()),
                status: Arc::new(StatusAggregator::new()),
                credential: Mutex::new(None),
                interrupts: watch::channel(0).0,
                pointer_task: Mutex::new(None),
            }),
        }
    }

    /// Installs the status listener.  Every observable change is sent as a
    /// full snapshot; a new listener replaces the previous one.
    pub fn set_status_listener(&self, listener: mpsc::UnboundedSender<StatusSnapshot>) {
        self.inner.status.set_listener(listener);
    }

    /// Returns a copy of the current status.
    pub fn status(&self) -> StatusSnapshot {
        self.inner.status.snapshot()
    }

    /// Current state of the pointer channel.
    pub fn pointer_state(&self) -> PointerState {
        self.inner.pointer.state()
    }

    /// Connects and pairs with the device at `address`.
    ///
    /// An existing session is fully disconnected first.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidCommand`] for an empty address.
    /// - [`ClientError::NotConnected`] if `disconnect` or another `connect`
    ///   is called before this one reaches `ready`.
    /// - [`ClientError::HandshakeRejected`] if the device refuses pairing.
    /// - [`ClientError::AllEndpointsFailed`] if no candidate endpoint worked.
    pub async fn connect(&self, address: &str) -> Result<(), ClientError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ClientError::InvalidCommand("device address is empty".into()));
        }

        let epoch = self.inner.interrupt();
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.is_interrupted(epoch) {
            debug!("connect to {address} superseded before it started");
            return Err(ClientError::NotConnected);
        }
        self.inner.teardown(false).await;
        self.inner.status.begin_session(address);
        info!("connecting to {address}");

        let credential = {
            let stored = self.inner.store.load();
            let mut cached = lock(&self.inner.credential);
            handshake::select_credential(stored, &mut cached, address)
        };

        let mut failures = Vec::new();
        for endpoint in candidates(address, &self.inner.config.endpoints) {
            // The next candidate is entered straight from `pairing`; the
            // session only reports `disconnected` once every candidate failed.
            if !failures.is_empty() {
                self.inner.status.set_state(SessionState::Connecting);
            }

            let attempt = tokio::select! {
                result = self.inner.attempt(&endpoint, credential.clone()) => result,
                () = self.inner.interrupted(epoch) => Err(AttemptError::Interrupted),
            };

            match attempt {
                Ok(outcome) => {
                    if let Some(record) =
                        handshake::persist_credential(self.inner.store.as_ref(), address, &outcome)
                    {
                        *lock(&self.inner.credential) = Some(record);
                    }
                    if self.inner.is_interrupted(epoch) {
                        info!("connect to {address} interrupted after pairing");
                        self.inner.channel.detach().await;
                        self.inner.status.reset(false);
                        return Err(ClientError::NotConnected);
                    }
                    self.inner.status.set_state(SessionState::Ready);
                    info!("connected to {address} via {endpoint}");
                    self.inner.activate().await;
                    return Ok(());
                }
                Err(AttemptError::Interrupted) => {
                    info!("connect to {address} interrupted");
                    self.inner.channel.detach().await;
                    self.inner.status.reset(false);
                    return Err(ClientError::NotConnected);
                }
                Err(AttemptError::Rejected(reason)) => {
                    warn!("{endpoint}: pairing rejected: {reason}");
                    self.inner.channel.detach().await;
                    self.inner.status.reset(true);
                    return Err(ClientError::HandshakeRejected(reason));
                }
                Err(AttemptError::Failed(reason)) => {
                    warn!("{endpoint}: {reason}");
                    self.inner.channel.detach().await;
                    failures.push(EndpointFailure {
                        endpoint: endpoint.url(),
                        reason,
                    });
                }
            }
        }

        self.inner.status.reset(true);
        Err(ClientError::AllEndpointsFailed { attempts: failures })
    }

    /// Ends the session.  Safe to call at any time, any number of times.
    ///
    /// A `connect` still in progress is interrupted.
    pub async fn disconnect(&self) {
        self.inner.interrupt();
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.status.state() != SessionState::Disconnected || self.inner.channel.is_open() {
            info!("disconnecting");
        }
        self.inner.teardown(false).await;
    }

    /// Sends a request to `uri` and returns the device's answer.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] unless ready, otherwise as
    /// [`MainChannel::request`].
    pub async fn request(&self, uri: &str, payload: Option<Value>) -> Result<WireMessage, ClientError> {
        self.ensure_ready()?;
        self.inner
            .channel
            .request(WireMessage::request(uri, payload), self.inner.config.request_timeout())
            .await
    }

    /// Presses the remote-control button `name` (e.g. `HOME`, `volumeup`).
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidCommand`] for a malformed name (nothing is sent),
    /// otherwise as [`request`](Self::request).
    pub async fn press_key(&self, name: &str) -> Result<(), ClientError> {
        let button = ButtonName::parse(name).map_err(|e| ClientError::InvalidCommand(e.to_string()))?;
        self.request(uris::SEND_BUTTON, Some(json!({ "name": button.as_str() })))
            .await?;
        Ok(())
    }

    /// Types `text` into the focused input field on the device.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub async fn send_text(&self, text: &str) -> Result<(), ClientError> {
        self.request(uris::INSERT_TEXT, Some(json!({ "text": text, "replace": 0 })))
            .await?;
        Ok(())
    }

    /// Moves the pointer by (`dx`, `dy`), rounded to whole pixels.
    ///
    /// Best-effort: dropped silently while the pointer channel is not open.
    pub async fn move_pointer(&self, dx: f64, dy: f64) {
        self.inner.pointer.send(PointerEvent::motion(dx, dy)).await;
    }

    /// Clicks the primary button: press now, release after the configured delay.
    ///
    /// Best-effort, like [`move_pointer`](Self::move_pointer).
    pub async fn click(&self) {
        if self.inner.pointer.state() != PointerState::Open {
            debug!("click dropped: pointer channel not open");
            return;
        }
        self.inner.pointer.send(PointerEvent::Press(PointerButton::Left)).await;
        time::sleep(self.inner.config.click_release_delay()).await;
        self.inner.pointer.send(PointerEvent::Release(PointerButton::Left)).await;
    }

    /// Scrolls by (`dx`, `dy`).  Best-effort.
    pub async fn scroll(&self, dx: f64, dy: f64) {
        self.inner.pointer.send(PointerEvent::scroll(dx, dy)).await;
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        if self.inner.status.state().is_ready() && self.inner.channel.is_open() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }
}

impl Connection {
    /// Signals any `connect` in flight to give up and returns the new epoch.
    fn interrupt(&self) -> u64 {
        let mut epoch = 0;
        self.interrupts.send_modify(|n| {
            *n = n.wrapping_add(1);
            epoch = *n;
        });
        epoch
    }

    fn is_interrupted(&self, epoch: u64) -> bool {
        *self.interrupts.borrow() != epoch
    }

    /// Resolves once someone calls [`interrupt`](Self::interrupt) after `epoch`.
    async fn interrupted(&self, epoch: u64) {
        let mut rx = self.interrupts.subscribe();
        let _ = rx.wait_for(|&n| n != epoch).await;
    }

    /// Opens `endpoint` and runs the handshake on it.
    async fn attempt(
        self: &Arc<Self>,
        endpoint: &Endpoint,
        credential: Option<String>,
    ) -> Result<handshake::HandshakeOutcome, AttemptError> {
        let stream = transport::open(&endpoint.url(), self.config.connect_timeout())
            .await
            .map_err(|e| AttemptError::Failed(e.to_string()))?;

        self.channel.attach(stream, self.hooks()).await;
        self.status.set_state(SessionState::Pairing);

        let payload = HandshakePayload::new(self.config.manifest.clone(), credential);
        handshake::perform(&self.channel, payload, self.config.pairing_timeout())
            .await
            .map_err(|e| match e {
                HandshakeError::Rejected(reason) => AttemptError::Rejected(reason),
                other => AttemptError::Failed(other.to_string()),
            })
    }

    /// Reader callbacks for a freshly attached socket.
    fn hooks(self: &Arc<Self>) -> ChannelHooks {
        let status = Arc::clone(&self.status);
        let weak: Weak<Connection> = Arc::downgrade(self);
        ChannelHooks {
            on_unsolicited: Arc::new(move |msg: WireMessage| {
                if let Some(payload) = msg.payload.as_ref() {
                    status.apply_payload(payload);
                }
            }),
            on_closed: Arc::new(move |generation: u64| {
                if let Some(conn) = weak.upgrade() {
                    tokio::spawn(async move { conn.transport_closed(generation).await });
                }
            }),
        }
    }

    /// Sends the default subscriptions and starts the pointer channel.
    async fn activate(self: &Arc<Self>) {
        for uri in [uris::FOREGROUND_APP, uris::VOLUME] {
            let status = Arc::clone(&self.status);
            let handler = Arc::new(move |msg: WireMessage| {
                if msg.kind == MessageKind::Error {
                    warn!("subscription {uri} failed: {}", msg.error_text().unwrap_or("unknown"));
                } else if let Some(payload) = msg.payload.as_ref() {
                    status.apply_payload(payload);
                }
            });
            if let Err(e) = self.channel.subscribe(WireMessage::subscribe(uri, None), handler).await {
                warn!("could not subscribe to {uri}: {e}");
            }
        }

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            if let Err(e) = this.open_pointer().await {
                warn!("{e}");
            }
        });
        if let Some(previous) = lock(&self.pointer_task).replace(task) {
            previous.abort();
        }
    }

    /// Asks the device for the pointer socket and opens it.
    async fn open_pointer(&self) -> Result<(), PointerChannelError> {
        let generation = self.channel.generation();
        let answer = self
            .channel
            .request(
                WireMessage::request(uris::POINTER_SOCKET, None),
                self.config.request_timeout(),
            )
            .await
            .map_err(|e| PointerChannelError::Unavailable(e.to_string()))?;
        let url = answer
            .payload_str("socketPath")
            .ok_or_else(|| PointerChannelError::Unavailable("answer has no socketPath".into()))?;

        self.pointer.open(url, self.config.connect_timeout()).await?;
        if self.channel.generation() != generation {
            debug!("session ended while the pointer channel was opening");
            self.pointer.close().await;
        }
        Ok(())
    }

    /// Handles the device closing the main socket of `generation`.
    async fn transport_closed(&self, generation: u64) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.channel.generation() != generation {
            debug!("ignoring close of superseded connection {generation}");
            return;
        }
        warn!("connection to device lost");
        self.teardown(true).await;
    }

    /// Releases every resource of the current session.  Idempotent.
    ///
    /// Callers must hold the lifecycle lock.
    async fn teardown(&self, keep_address: bool) {
        if let Some(task) = lock(&self.pointer_task).take() {
            task.abort();
        }
        self.pointer.close().await;
        self.channel.detach().await;
        self.status.reset(keep_address);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
