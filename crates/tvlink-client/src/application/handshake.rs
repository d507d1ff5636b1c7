//! Pairing handshake.
//!
//! The handshake is a single `register` message answered by one or more
//! replies under the same id:
//!
//! ```text
//! client                                device
//!   | register {manifest, credential?}    |
//!   |------------------------------------>|
//!   |        response {pairingType}       |   (prompt shown; keep waiting)
//!   |<------------------------------------|
//!   |        registered {credential}      |   (user accepted)
//!   |<------------------------------------|
//! ```
//!
//! A device that already trusts the presented credential skips the prompt
//! and answers `registered` straight away.  Some firmware answers with a
//! plain `response` carrying the credential instead of `registered`; that
//! is treated as success too.  An `error` reply is a terminal rejection.
//!
//! The wait is bounded by the pairing timeout, which is much longer than
//! the transport timeout because it includes a human walking to the device.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use tvlink_core::protocol::HandshakePayload;
use tvlink_core::{DeviceCredential, MessageKind, WireMessage};

use crate::error::ClientError;
use crate::infrastructure::network::channel::MainChannel;
use crate::infrastructure::storage::credentials::CredentialStore;

/// Why a handshake did not complete.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The device answered with an explicit error.
    #[error("device rejected pairing: {0}")]
    Rejected(String),

    /// No terminal reply arrived within the pairing timeout.
    #[error("no pairing answer within {0:?}")]
    Timeout(Duration),

    /// The register message could not be sent or the socket closed.
    #[error("pairing interrupted: {0}")]
    Interrupted(#[from] ClientError),
}

/// Classification of one reply to the `register` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    /// Terminal success, optionally carrying a (new) credential.
    Accepted { credential: Option<String> },
    /// Terminal failure.
    Rejected(String),
    /// The device is still waiting for the user.
    Pending,
}

/// Successful handshake result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Credential issued by the device, if it sent one.
    pub credential: Option<String>,
}

/// Classifies one reply to the `register` message.
pub fn classify(reply: &WireMessage) -> HandshakeReply {
    match reply.kind {
        MessageKind::Registered => HandshakeReply::Accepted {
            credential: reply.credential().map(str::to_string),
        },
        MessageKind::Error => HandshakeReply::Rejected(
            reply.error_text().unwrap_or("pairing refused").to_string(),
        ),
        MessageKind::Response => match reply.credential() {
            Some(credential) => HandshakeReply::Accepted {
                credential: Some(credential.to_string()),
            },
            None => HandshakeReply::Pending,
        },
        _ => HandshakeReply::Pending,
    }
}

/// Sends `payload` as a `register` message and waits for a terminal reply.
///
/// # Errors
///
/// - [`HandshakeError::Rejected`] if the device answers with `error`.
/// - [`HandshakeError::Timeout`] if nothing terminal arrives within `timeout`.
/// - [`HandshakeError::Interrupted`] if the message cannot be sent or the
///   channel is torn down while waiting.
pub async fn perform(
    channel: &MainChannel,
    payload: HandshakePayload,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    debug!(
        "sending register ({} credential)",
        if payload.credential.is_some() { "with" } else { "without" }
    );

    let (tx, mut replies) = mpsc::unbounded_channel::<WireMessage>();
    let id = channel
        .subscribe(
            WireMessage::register(&payload),
            Arc::new(move |reply: WireMessage| {
                let _ = tx.send(reply);
            }),
        )
        .await?;

    let result = wait_for_terminal(&mut replies, timeout).await;
    channel.unsubscribe(&id);
    result
}

async fn wait_for_terminal(
    replies: &mut mpsc::UnboundedReceiver<WireMessage>,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError> {
    let deadline = Instant::now() + timeout;
    loop {
        let reply = match time::timeout_at(deadline, replies.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(HandshakeError::Interrupted(ClientError::NotConnected)),
            Err(_) => return Err(HandshakeError::Timeout(timeout)),
        };

        match classify(&reply) {
            HandshakeReply::Accepted { credential } => {
                info!(
                    "pairing accepted ({})",
                    if credential.is_some() { "credential issued" } else { "no credential" }
                );
                return Ok(HandshakeOutcome { credential });
            }
            HandshakeReply::Rejected(reason) => return Err(HandshakeError::Rejected(reason)),
            HandshakeReply::Pending => info!("waiting for the user to accept pairing on the device"),
        }
    }
}

// ── Credential selection and persistence ──────────────────────────────────────

/// A credential held in memory between connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub record: DeviceCredential,
    /// `false` if the last save of this record failed, so the store may
    /// still hold an older credential.
    pub persisted: bool,
}

/// Picks the credential to present to the device at `address`.
///
/// A freshly loaded `stored` record refreshes `cached`, unless `cached` is an
/// unsaved record for the same address: that one was issued after the store
/// was last written and wins.  Either way a credential is only returned if it
/// was issued by `address`.
pub fn select_credential(
    stored: Option<DeviceCredential>,
    cached: &mut Option<CachedCredential>,
    address: &str,
) -> Option<String> {
    let unsaved_match = cached
        .as_ref()
        .is_some_and(|c| !c.persisted && c.record.applies_to(address));
    if unsaved_match {
        debug!("presenting the credential that could not be saved last time");
    } else if let Some(record) = stored {
        *cached = Some(CachedCredential {
            record,
            persisted: true,
        });
    }

    let chosen = cached
        .as_ref()
        .filter(|c| c.record.applies_to(address))
        .map(|c| c.record.credential.clone());
    if chosen.is_none() && cached.is_some() {
        debug!("stored credential belongs to another device; pairing without it");
    }
    chosen
}

/// Persists a newly issued credential for `address`.
///
/// Returns the record that now represents the credential in memory, or
/// `None` if the handshake issued nothing.  A failed save is logged and
/// otherwise ignored: the session is already established.
pub fn persist_credential(
    store: &dyn CredentialStore,
    address: &str,
    outcome: &HandshakeOutcome,
) -> Option<CachedCredential> {
    let credential = outcome.credential.as_deref().filter(|k| !k.is_empty())?;
    let record = DeviceCredential::new(address, credential);
    let persisted = match store.save(&record) {
        Ok(()) => true,
        Err(e) => {
            warn!("could not persist credential for {address}: {e}");
            false
        }
    };
    Some(CachedCredential { record, persisted })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
