//! # tvlink-core
//!
//! Shared library for TvLink containing the main-channel wire format, the
//! pointer-channel binary codec, and the session domain types.
//!
//! This crate is used by the client crate and by anything that wants to
//! speak the protocol without pulling in a network stack.  It has zero
//! dependencies on sockets, files, or async runtimes.
//!
//! # Architecture overview
//!
//! TvLink drives a networked display device over a single persistent
//! WebSocket.  A client connects, pairs once (the device shows a prompt and
//! hands back a credential), and from then on can press buttons, inject text,
//! and move an on-screen pointer while receiving status updates.
//!
//! - **`protocol`** – How bytes travel.  The main channel carries JSON text
//!   frames correlated by an `id` field; the pointer channel carries compact
//!   6-byte binary frames.
//!
//! - **`domain`** – Pure session logic: the connection state machine, the
//!   status snapshot and how partial updates merge into it, stored
//!   credentials, and the ordered list of endpoints to try.

pub mod domain;
pub mod protocol;

pub use domain::button::ButtonName;
pub use domain::credential::DeviceCredential;
pub use domain::endpoint::{Endpoint, EndpointTemplate, Scheme};
pub use domain::session::SessionState;
pub use domain::status::{StatusPatch, StatusSnapshot};
pub use protocol::messages::{decode_text, encode_text, MessageKind, WireMessage};
pub use protocol::pointer::{decode_frame, encode_frame, PointerButton, PointerEvent};
pub use protocol::ProtocolError;
