//! Binary codec for pointer-channel frames.
//!
//! Wire format (one WebSocket binary message per frame):
//! ```text
//! [kind:1][button:1][dx:2][dy:2]
//! ```
//! Total frame size: 6 bytes.  `dx`/`dy` are signed 16-bit little-endian
//! deltas; they are zero for press/release frames.  `button` is zero for
//! move/scroll frames.
//!
//! The pointer channel is latency sensitive, so frames are fixed-size and
//! never batched: a move produced by the caller goes out as its own frame.

use super::ProtocolError;

/// Size of every pointer frame in bytes.
pub const FRAME_SIZE: usize = 6;

const KIND_MOVE: u8 = 0x01;
const KIND_PRESS: u8 = 0x02;
const KIND_RELEASE: u8 = 0x03;
const KIND_SCROLL: u8 = 0x04;

/// Pointer button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PointerButton {
    Left = 0x01,
    Right = 0x02,
    Middle = 0x03,
}

impl TryFrom<u8> for PointerButton {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PointerButton::Left),
            0x02 => Ok(PointerButton::Right),
            0x03 => Ok(PointerButton::Middle),
            other => Err(ProtocolError::UnknownButton(other)),
        }
    }
}

/// A single event on the pointer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    /// Relative pointer motion.
    Move { dx: i16, dy: i16 },
    /// Button pushed down.
    Press(PointerButton),
    /// Button let go.
    Release(PointerButton),
    /// Relative wheel motion.
    Scroll { dx: i16, dy: i16 },
}

impl PointerEvent {
    /// Builds a move event from fractional deltas, rounding to the nearest
    /// integer and saturating at the `i16` range.
    pub fn motion(dx: f64, dy: f64) -> Self {
        PointerEvent::Move {
            dx: saturate(dx),
            dy: saturate(dy),
        }
    }

    /// Builds a scroll event from fractional deltas (same rounding as [`motion`](Self::motion)).
    pub fn scroll(dx: f64, dy: f64) -> Self {
        PointerEvent::Scroll {
            dx: saturate(dx),
            dy: saturate(dy),
        }
    }
}

fn saturate(value: f64) -> i16 {
    if value.is_nan() {
        return 0;
    }
    // `as` saturates float→int conversions at the target range.
    value.round() as i16
}

/// Encodes a [`PointerEvent`] into a fixed 6-byte frame.
///
/// # Examples
///
/// ```rust
/// use tvlink_core::protocol::pointer::{encode_frame, PointerEvent};
///
/// let frame = encode_frame(&PointerEvent::Move { dx: 1, dy: -1 });
/// assert_eq!(frame, [0x01, 0x00, 0x01, 0x00, 0xFF, 0xFF]);
/// ```
pub fn encode_frame(event: &PointerEvent) -> [u8; FRAME_SIZE] {
    let (kind, button, dx, dy) = match *event {
        PointerEvent::Move { dx, dy } => (KIND_MOVE, 0, dx, dy),
        PointerEvent::Press(b) => (KIND_PRESS, b as u8, 0, 0),
        PointerEvent::Release(b) => (KIND_RELEASE, b as u8, 0, 0),
        PointerEvent::Scroll { dx, dy } => (KIND_SCROLL, 0, dx, dy),
    };

    let mut frame = [0u8; FRAME_SIZE];
    frame[0] = kind;
    frame[1] = button;
    frame[2..4].copy_from_slice(&dx.to_le_bytes());
    frame[4..6].copy_from_slice(&dy.to_le_bytes());
    frame
}

/// Decodes one [`PointerEvent`] from the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the slice is short or a discriminant byte is
/// unknown.
pub fn decode_frame(bytes: &[u8]) -> Result<PointerEvent, ProtocolError> {
    if bytes.len() < FRAME_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: FRAME_SIZE,
            available: bytes.len(),
        });
    }

    let dx = i16::from_le_bytes([bytes[2], bytes[3]]);
    let dy = i16::from_le_bytes([bytes[4], bytes[5]]);

    match bytes[0] {
        KIND_MOVE => Ok(PointerEvent::Move { dx, dy }),
        KIND_PRESS => Ok(PointerEvent::Press(PointerButton::try_from(bytes[1])?)),
        KIND_RELEASE => Ok(PointerEvent::Release(PointerButton::try_from(bytes[1])?)),
        KIND_SCROLL => Ok(PointerEvent::Scroll { dx, dy }),
        other => Err(ProtocolError::UnknownEventKind(other)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
