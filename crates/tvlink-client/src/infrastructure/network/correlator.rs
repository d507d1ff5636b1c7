//! Request/response correlation and the subscription registry.
//!
//! Every outgoing main-channel message carries an `id`.  The correlator
//! remembers who is waiting for that id:
//!
//! - a **pending request** is a single-shot `oneshot` sender, removed the
//!   moment its answer arrives (or when the caller gives up);
//! - a **subscription** is a durable handler that receives every message
//!   carrying its id until it is explicitly removed or the session resets.
//!
//! [`Correlator::dispatch`] is called by the channel reader for every
//! decoded inbound message.  It never blocks: handlers must hand work off
//! (update a snapshot, push into a channel) rather than await anything.
//!
//! # Locking
//!
//! Both maps sit behind `std::sync::Mutex`.  The locks are only held for a
//! map operation and never across an `.await`; subscription handlers are
//! invoked after the lock has been released so a handler may itself
//! register or remove entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, trace};
use tvlink_core::protocol::RequestIdGenerator;
use tvlink_core::WireMessage;

/// Durable handler invoked for every message routed to a subscription.
pub type SubscriptionHandler = Arc<dyn Fn(WireMessage) + Send + Sync>;

/// Result of routing one inbound message.
#[derive(Debug)]
pub enum Dispatch {
    /// A pending request was resolved (and possibly a subscription notified).
    Resolved,
    /// A subscription handler received the message.
    Subscription,
    /// No pending request or subscription claims this message.
    Unmatched(WireMessage),
}

/// Routes inbound messages to the request or subscription that caused them.
pub struct Correlator {
    ids: RequestIdGenerator,
    pending: Mutex<HashMap<String, oneshot::Sender<WireMessage>>>,
    subscriptions: Mutex<HashMap<String, SubscriptionHandler>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking handler cannot leave the maps half-updated, so a poisoned
    // lock is still safe to use.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Correlator {
    /// Creates an empty correlator with its own id sequence.
    pub fn new() -> Self {
        Self {
            ids: RequestIdGenerator::new(),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Gives `msg` a fresh identifier unless it already carries one, and
    /// returns the identifier in use.
    pub fn assign_id(&self, msg: &mut WireMessage) -> String {
        match &msg.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = self.ids.next_id(msg.kind);
                msg.id = Some(id.clone());
                id
            }
        }
    }

    /// Registers a single-shot waiter for `id`.
    ///
    /// A second registration for the same id replaces the first; the
    /// replaced waiter observes a closed channel.
    pub fn register_pending(&self, id: &str) -> oneshot::Receiver<WireMessage> {
        let (tx, rx) = oneshot::channel();
        if lock(&self.pending).insert(id.to_string(), tx).is_some() {
            debug!("replaced an outstanding waiter for {id}");
        }
        rx
    }

    /// Forgets the waiter for `id`.  Returns `true` if one was outstanding.
    ///
    /// Used when a request times out or could not be sent, so that a late
    /// answer for `id` is silently dropped.
    pub fn cancel(&self, id: &str) -> bool {
        lock(&self.pending).remove(id).is_some()
    }

    /// Registers a durable handler for every message carrying `id`.
    pub fn register_subscription(&self, id: &str, handler: SubscriptionHandler) {
        lock(&self.subscriptions).insert(id.to_string(), handler);
    }

    /// Removes the subscription for `id`.  Returns `true` if it existed.
    pub fn remove_subscription(&self, id: &str) -> bool {
        lock(&self.subscriptions).remove(id).is_some()
    }

    /// Routes one inbound message.
    ///
    /// A pending waiter for the message id is resolved and removed; a
    /// subscription for the same id is notified and kept.  Messages without
    /// an id, or with an id nobody is waiting for, come back as
    /// [`Dispatch::Unmatched`].
    pub fn dispatch(&self, msg: WireMessage) -> Dispatch {
        let Some(id) = msg.id.clone() else {
            return Dispatch::Unmatched(msg);
        };

        let waiter = lock(&self.pending).remove(&id);
        let handler = lock(&self.subscriptions).get(&id).cloned();

        match (waiter, handler) {
            (Some(tx), Some(handler)) => {
                handler(msg.clone());
                // The receiver may already be gone if the caller timed out.
                let _ = tx.send(msg);
                Dispatch::Resolved
            }
            (Some(tx), None) => {
                if tx.send(msg).is_err() {
                    trace!("waiter for {id} went away before its answer");
                }
                Dispatch::Resolved
            }
            (None, Some(handler)) => {
                handler(msg);
                Dispatch::Subscription
            }
            (None, None) => {
                debug!("no waiter or subscription for {id}");
                Dispatch::Unmatched(msg)
            }
        }
    }

    /// Drops every pending waiter and subscription.
    ///
    /// Dropped waiters observe a closed channel, which callers report as
    /// "not connected".  Returns `(pending, subscriptions)` counts removed.
    pub fn clear(&self) -> (usize, usize) {
        let pending = std::mem::take(&mut *lock(&self.pending));
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        (pending.len(), subscriptions.len())
    }

    /// Number of outstanding single-shot waiters.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
