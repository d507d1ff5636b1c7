//! Main-channel message envelope.
//!
//! Every frame on the main WebSocket is a JSON text object with a `"type"`
//! discriminant and an optional `"id"` used to correlate responses with the
//! request that caused them.
//!
//! ```json
//! {"type":"request","id":"request_7","uri":"ssap://audio/getVolume"}
//! {"type":"response","id":"request_7","payload":{"volume":12,"muted":false}}
//! {"type":"error","id":"request_8","error":"404 no such service"}
//! ```
//!
//! Unlike a serde *tagged enum*, the envelope is a flat struct: the device
//! reuses the same handful of fields (`id`, `uri`, `payload`, `error`) for
//! every message type, and future firmware may add types we do not know about.
//! Unknown `"type"` values decode as [`MessageKind::Unknown`] instead of
//! failing, so a newer device never breaks an older client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProtocolError;

/// Payload field carrying the pairing credential, both in the handshake
/// request and in the device's replies.
pub const CREDENTIAL_FIELD: &str = "credential";

/// Pairing mode requesting an on-device approval prompt.
pub const PAIRING_TYPE_PROMPT: &str = "PROMPT";

// ── Message kinds ─────────────────────────────────────────────────────────────

/// The `"type"` discriminant of a main-channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// One-shot request expecting exactly one `response` or `error`.
    Request,
    /// Answer to a `request`, a `subscribe`, or (leniently) a `register`.
    Response,
    /// Durable request: the device keeps answering under the same id.
    Subscribe,
    /// Handshake request carrying the client manifest.
    Register,
    /// Terminal handshake acknowledgment.
    Registered,
    /// Failure answer to any request type.
    Error,
    /// Any type string this client does not know.
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// Prefix used when generating request identifiers of this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            MessageKind::Register => "register",
            MessageKind::Subscribe => "subscribe",
            _ => "request",
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// A single main-channel message in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireMessage {
    fn outbound(kind: MessageKind, uri: Option<&str>, payload: Option<Value>) -> Self {
        Self {
            kind,
            id: None,
            uri: uri.map(str::to_string),
            payload,
            error: None,
        }
    }

    /// Builds a one-shot request for `uri`.
    pub fn request(uri: &str, payload: Option<Value>) -> Self {
        Self::outbound(MessageKind::Request, Some(uri), payload)
    }

    /// Builds a durable subscription request for `uri`.
    pub fn subscribe(uri: &str, payload: Option<Value>) -> Self {
        Self::outbound(MessageKind::Subscribe, Some(uri), payload)
    }

    /// Builds the handshake request.
    pub fn register(payload: &HandshakePayload) -> Self {
        // HandshakePayload only holds strings, so conversion cannot fail.
        let value = serde_json::to_value(payload).unwrap_or(Value::Null);
        Self::outbound(MessageKind::Register, None, Some(value))
    }

    /// Returns a copy of this message carrying `id`.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns the string value of a top-level payload field, if present.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.as_ref()?.get(field)?.as_str()
    }

    /// Returns the credential carried by this message, ignoring empty strings.
    pub fn credential(&self) -> Option<&str> {
        self.payload_str(CREDENTIAL_FIELD).filter(|k| !k.is_empty())
    }

    /// Returns the human-readable failure text of an `error` message.
    ///
    /// Devices put it either in the top-level `error` field or in
    /// `payload.errorText`; the former wins.
    pub fn error_text(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.payload_str("errorText"))
    }
}

/// Decodes one main-channel text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] if the text is not a JSON
/// object with a string `"type"` field.
pub fn decode_text(text: &str) -> Result<WireMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

/// Encodes one main-channel message as a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] if the payload cannot be
/// serialized (only possible for non-string map keys, which `Value` never has).
pub fn encode_text(msg: &WireMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

// ── Handshake payload ─────────────────────────────────────────────────────────

/// Client identity and capability manifest presented during pairing.
///
/// The device shows `app_name`/`vendor` in its approval prompt and grants
/// only the listed permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub app_id: String,
    pub app_name: String,
    pub vendor: String,
    pub permissions: Vec<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            app_id: "io.tvlink.remote".to_string(),
            app_name: "TvLink Remote".to_string(),
            vendor: "TvLink".to_string(),
            permissions: [
                "LAUNCH",
                "CONTROL_AUDIO",
                "CONTROL_INPUT_TEXT",
                "CONTROL_MOUSE_AND_KEYBOARD",
                "READ_RUNNING_APPS",
                "READ_CURRENT_CHANNEL",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// Payload of the `register` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    pub pairing_type: String,
    pub manifest: Manifest,
    /// Previously issued credential; omitted entirely on first pairing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl HandshakePayload {
    /// Builds a prompt-mode handshake, attaching `credential` when given.
    pub fn new(manifest: Manifest, credential: Option<String>) -> Self {
        Self {
            pairing_type: PAIRING_TYPE_PROMPT.to_string(),
            manifest,
            credential: credential.filter(|k| !k.is_empty()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
