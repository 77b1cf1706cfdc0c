//! Signaling wire protocol
//!
//! Closed set of messages exchanged between participants and the relay,
//! serialized as JSON text frames.

pub mod message;

pub use message::{ClientMessage, ErrorCode, PeerInfo, Role, ServerMessage, SessionId};
