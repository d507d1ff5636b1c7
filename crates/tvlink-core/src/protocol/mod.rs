//! Protocol module containing the main-channel envelope, the pointer codec,
//! and the request identifier generator.

pub mod messages;
pub mod pointer;
pub mod sequence;
pub mod uris;

use thiserror::Error;

pub use messages::{decode_text, encode_text, HandshakePayload, Manifest, MessageKind, WireMessage};
pub use pointer::{decode_frame, encode_frame, PointerButton, PointerEvent, FRAME_SIZE};
pub use sequence::RequestIdGenerator;

/// Errors that can occur while encoding or decoding protocol frames.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than a complete pointer frame.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The pointer frame kind byte is not a recognized value.
    #[error("unknown pointer event kind: 0x{0:02X}")]
    UnknownEventKind(u8),

    /// The pointer frame button byte is not a recognized value.
    #[error("unknown pointer button: 0x{0:02X}")]
    UnknownButton(u8),

    /// A main-channel text frame was not a valid JSON envelope.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}
