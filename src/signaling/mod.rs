//! Signaling relay
//!
//! Brokers negotiation between the producer and viewer of each session.
//!
//! Per-session state machine (kept by the registry):
//!
//! ```text
//!   Empty ──join──► AwaitingPeer ──join(other role)──► Paired
//!                        ▲                              │
//!                        └──── leave / transport close ─┘
//!   AwaitingPeer ──last leave / idle timeout──► Closed
//! ```
//!
//! `offer`, `answer` and `ice-candidate` are forwarded verbatim to the other
//! participant. With no peer present they are dropped; endpoints renegotiate
//! after `peer-joined` instead of relying on the relay to buffer.

pub mod participant;
pub mod relay;

pub use participant::Participant;
pub use relay::{Outcome, SignalingRelay, DEFAULT_OUTBOUND_CAPACITY};
