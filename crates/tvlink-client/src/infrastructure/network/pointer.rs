//! The auxiliary pointer channel.
//!
//! Once the main session is ready, the device hands out a session-scoped
//! socket URL for pointer input.  Motion and button frames go out on that
//! socket as fixed-size binary messages with no acknowledgment.
//!
//! The channel is strictly best-effort: while it is absent or still
//! connecting, pointer events are dropped without error, and a failure on
//! this socket never touches the main session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use tvlink_core::{encode_frame, PointerEvent};

use super::transport::{self, WsSink};
use super::TransportError;

/// Errors raised while opening or writing the pointer channel.
///
/// Callers log these and carry on; they are never surfaced to the user.
#[derive(Debug, Error)]
pub enum PointerChannelError {
    /// The device did not provide a usable pointer socket.
    #[error("pointer channel unavailable: {0}")]
    Unavailable(String),
    /// The pointer socket failed to open or to accept a frame.
    #[error("pointer channel transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Observable state of the pointer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerState {
    #[default]
    Absent,
    Connecting,
    Open,
}

#[derive(Debug, Default)]
struct Slot {
    state: PointerState,
    generation: u64,
}

/// Owner of the pointer socket.  Reused across sessions.
pub struct PointerChannel {
    slot: Mutex<Slot>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PointerChannel {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            sink: tokio::sync::Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> PointerState {
        lock(&self.slot).state
    }

    /// Opens the pointer socket at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PointerChannelError::Transport`] if the socket cannot be
    /// opened; the channel is left [`PointerState::Absent`].
    pub async fn open(self: &Arc<Self>, url: &str, timeout: Duration) -> Result<(), PointerChannelError> {
        let generation = {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            slot.state = PointerState::Connecting;
            slot.generation
        };

        let stream = match transport::open(url, timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.reset_if_current(generation);
                return Err(e.into());
            }
        };

        let (sink, mut source) = stream.split();
        *self.sink.lock().await = Some(sink);
        let superseded = {
            let mut slot = lock(&self.slot);
            if slot.generation == generation {
                slot.state = PointerState::Open;
            }
            slot.generation != generation
        };
        if superseded {
            self.sink.lock().await.take();
            return Err(PointerChannelError::Unavailable("closed while connecting".into()));
        }

        // The device never sends on this socket; reading only detects closure.
        let this = Arc::clone(self);
        let watcher = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => trace!("ignoring inbound pointer-channel frame"),
                }
            }
            if this.reset_if_current(generation) {
                info!("pointer channel closed by device");
                this.sink.lock().await.take();
            }
        });
        if let Some(previous) = lock(&self.watcher).replace(watcher) {
            previous.abort();
        }

        info!("pointer channel open");
        Ok(())
    }

    /// Sends one pointer event if the channel is open; otherwise drops it.
    ///
    /// A write failure tears the channel down; later events are dropped
    /// until it is reopened by the next session.
    pub async fn send(&self, event: PointerEvent) {
        let generation = {
            let slot = lock(&self.slot);
            if slot.state != PointerState::Open {
                trace!("pointer channel {:?}; dropping {event:?}", slot.state);
                return;
            }
            slot.generation
        };

        let frame = encode_frame(&event);
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(Message::Binary(frame.to_vec())).await {
            warn!("{}", PointerChannelError::Transport(TransportError::Ws(e)));
            guard.take();
            self.reset_if_current(generation);
        }
    }

    /// Closes the pointer socket.  Safe to call when nothing is open.
    pub async fn close(&self) {
        {
            let mut slot = lock(&self.slot);
            slot.generation += 1;
            slot.state = PointerState::Absent;
        }
        if let Some(watcher) = lock(&self.watcher).take() {
            watcher.abort();
        }
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if time::timeout(Duration::from_millis(500), sink.close()).await.is_err() {
                debug!("pointer channel close timed out");
            }
        }
    }

    /// Returns to `Absent` if `generation` is still current.
    fn reset_if_current(&self, generation: u64) -> bool {
        let mut slot = lock(&self.slot);
        if slot.generation == generation && slot.state != PointerState::Absent {
            slot.state = PointerState::Absent;
            true
        } else {
            false
        }
    }
}

impl Default for PointerChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
