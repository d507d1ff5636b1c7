//! The main channel: one WebSocket carrying JSON requests, responses, and
//! subscription traffic.
//!
//! # Lifecycle
//!
//! A single [`MainChannel`] lives as long as the client and is reused across
//! reconnects.  [`attach`](MainChannel::attach) hands it a freshly opened
//! socket, bumps the generation, and spawns the reader task;
//! [`detach`](MainChannel::detach) aborts the reader, closes the socket, and
//! fails every outstanding request.
//!
//! When the *device* closes the socket, the reader task marks the channel
//! closed, clears the correlator so waiters fail fast, and reports the
//! generation through [`ChannelHooks::on_closed`].  If the socket has already
//! been replaced by then, the stale generation is ignored entirely.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use tvlink_core::{decode_text, encode_text, MessageKind, WireMessage};

use super::correlator::{Correlator, Dispatch, SubscriptionHandler};
use super::transport::{WsSink, WsSource, WsStream};
use super::TransportError;
use crate::error::ClientError;

/// How long an explicit close waits for the close frame to be written.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Callbacks the reader task invokes; both must return without blocking.
#[derive(Clone)]
pub struct ChannelHooks {
    /// Called for inbound messages that no request or subscription claims.
    pub on_unsolicited: Arc<dyn Fn(WireMessage) + Send + Sync>,
    /// Called once when the device closes the socket of `generation`.
    pub on_closed: Arc<dyn Fn(u64) + Send + Sync>,
}

impl ChannelHooks {
    /// Hooks that ignore everything.
    pub fn noop() -> Self {
        Self {
            on_unsolicited: Arc::new(|_: WireMessage| {}),
            on_closed: Arc::new(|_: u64| {}),
        }
    }
}

#[derive(Debug, Default)]
struct Link {
    generation: u64,
    open: bool,
}

/// Owner of the main WebSocket and its correlator.
pub struct MainChannel {
    correlator: Correlator,
    link: Mutex<Link>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MainChannel {
    /// Creates a channel with no socket attached.
    pub fn new() -> Self {
        Self {
            correlator: Correlator::new(),
            link: Mutex::new(Link::default()),
            sink: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Returns `true` while a socket is attached and has not closed.
    pub fn is_open(&self) -> bool {
        lock(&self.link).open
    }

    /// Generation of the most recent attach or detach.
    pub fn generation(&self) -> u64 {
        lock(&self.link).generation
    }

    /// Generation of the open socket, or `NotConnected`.
    fn open_generation(&self) -> Result<u64, ClientError> {
        let link = lock(&self.link);
        if link.open {
            Ok(link.generation)
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// The correlator routing this channel's traffic.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Takes ownership of `stream` and starts reading from it.
    ///
    /// Returns the generation assigned to this socket.  Any socket attached
    /// before should have been detached first.
    pub async fn attach(self: &Arc<Self>, stream: WsStream, hooks: ChannelHooks) -> u64 {
        let (sink, source) = stream.split();

        // Sink and generation change together under the sink lock, so a
        // writer never pairs the new socket with an old generation.
        let mut slot = self.sink.lock().await;
        *slot = Some(sink);
        let generation = {
            let mut link = lock(&self.link);
            link.generation += 1;
            link.open = true;
            link.generation
        };
        drop(slot);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.read_loop(source, generation, hooks).await });
        if let Some(previous) = lock(&self.reader).replace(handle) {
            previous.abort();
        }
        debug!("main channel attached (generation {generation})");
        generation
    }

    /// Closes the current socket, if any, and fails all outstanding requests.
    ///
    /// Safe to call repeatedly.  The generation is bumped so that a reader
    /// still winding down is treated as stale.
    pub async fn detach(&self) {
        {
            let mut link = lock(&self.link);
            link.generation += 1;
            link.open = false;
        }
        if let Some(reader) = lock(&self.reader).take() {
            reader.abort();
        }
        let (pending, subscriptions) = self.correlator.clear();
        if pending > 0 || subscriptions > 0 {
            debug!("dropped {pending} pending request(s) and {subscriptions} subscription(s)");
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match time::timeout(CLOSE_GRACE, sink.close()).await {
                Ok(Ok(())) => trace!("main channel close frame sent"),
                Ok(Err(e)) => debug!("main channel close failed: {e}"),
                Err(_) => debug!("main channel close timed out"),
            }
        }
    }

    /// Sends `msg` and waits for the answer carrying the same id.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] if no socket is open (nothing is sent)
    ///   or the channel is torn down while waiting.
    /// - [`ClientError::RequestTimeout`] if no answer arrives within `timeout`;
    ///   the waiter is removed so a late answer is ignored.
    /// - [`ClientError::Device`] if the device answers with `type: "error"`.
    pub async fn request(&self, msg: WireMessage, timeout: Duration) -> Result<WireMessage, ClientError> {
        let generation = self.open_generation()?;
        self.request_on(generation, msg, timeout).await
    }

    /// Like [`request`](Self::request), but only on the socket of `generation`.
    async fn request_on(
        &self,
        generation: u64,
        mut msg: WireMessage,
        timeout: Duration,
    ) -> Result<WireMessage, ClientError> {
        let id = self.correlator.assign_id(&mut msg);
        let rx = self.correlator.register_pending(&id);
        if let Err(e) = self.send(&msg, generation).await {
            self.correlator.cancel(&id);
            return Err(e);
        }

        match time::timeout(timeout, rx).await {
            Ok(Ok(answer)) if answer.kind == MessageKind::Error => {
                let text = answer.error_text().unwrap_or("unspecified error").to_string();
                debug!("{id} failed on the device: {text}");
                Err(ClientError::Device(text))
            }
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_) => {
                self.correlator.cancel(&id);
                warn!("{id} unanswered after {timeout:?}");
                Err(ClientError::RequestTimeout { id, after: timeout })
            }
        }
    }

    /// Sends `msg` and routes every answer carrying its id to `handler`.
    ///
    /// Returns the subscription id.  The handler stays registered until
    /// [`unsubscribe`](Self::unsubscribe) or [`detach`](Self::detach).
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] if no socket is open, or the write error.
    pub async fn subscribe(
        &self,
        mut msg: WireMessage,
        handler: SubscriptionHandler,
    ) -> Result<String, ClientError> {
        let generation = self.open_generation()?;
        let id = self.correlator.assign_id(&mut msg);
        self.correlator.register_subscription(&id, handler);
        if let Err(e) = self.send(&msg, generation).await {
            self.correlator.remove_subscription(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Stops routing answers for subscription `id`.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.correlator.remove_subscription(id)
    }

    /// Encodes and writes one message on the socket of `generation`.
    ///
    /// Fails with `NotConnected` if that socket was closed or replaced.
    async fn send(&self, msg: &WireMessage, generation: u64) -> Result<(), ClientError> {
        let text = encode_text(msg)?;
        let mut guard = self.sink.lock().await;
        if self.open_generation().ok() != Some(generation) {
            debug!("not sending {:?}: generation {generation} is gone", msg.id);
            return Err(ClientError::NotConnected);
        }
        let sink = guard.as_mut().ok_or(ClientError::NotConnected)?;
        debug!("-> {:?} {}", msg.kind, msg.id.as_deref().unwrap_or("-"));
        sink.send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Transport(TransportError::Ws(e)))
    }

    /// Reads frames until the socket closes, then reports the closure.
    async fn read_loop(self: Arc<Self>, mut source: WsSource, generation: u64, hooks: ChannelHooks) {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => match decode_text(&text) {
                    Ok(msg) => {
                        debug!("<- {:?} {}", msg.kind, msg.id.as_deref().unwrap_or("-"));
                        if let Dispatch::Unmatched(msg) = self.correlator.dispatch(msg) {
                            (hooks.on_unsolicited)(msg);
                        }
                    }
                    Err(e) => warn!("skipping undecodable main-channel frame: {e}"),
                },
                Ok(Message::Close(frame)) => {
                    debug!("device closed the main channel: {frame:?}");
                    break;
                }
                Ok(Message::Binary(bytes)) => {
                    debug!("ignoring {}-byte binary frame on the main channel", bytes.len());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("main channel read error: {e}");
                    break;
                }
            }
        }

        if self.mark_closed(generation) {
            (hooks.on_closed)(generation);
        } else {
            trace!("reader for stale generation {generation} exited");
        }
    }

    /// Marks `generation` closed.  Returns `false` if it was already superseded.
    fn mark_closed(&self, generation: u64) -> bool {
        let mut link = lock(&self.link);
        if link.generation != generation || !link.open {
            return false;
        }
        link.open = false;
        // Cleared under the link lock so a concurrent attach cannot register
        // entries that this clear would wipe.
        self.correlator.clear();
        true
    }
}

impl Default for MainChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
