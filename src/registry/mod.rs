//! Session registry for two-peer negotiation
//!
//! The registry owns every participant connection and maps session ids to
//! at most one producer and one viewer.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                 ┌──────────────────────────────┐
//!                 │ sessions: HashMap<SessionId, │
//!                 │   Mutex<SessionEntry {       │
//!                 │     producer: Option<..>,    │
//!                 │     viewer:   Option<..>,    │
//!                 │   }>                         │
//!                 │ >                            │
//!                 └──────────────┬───────────────┘
//!                                │
//!            ┌───────────────────┴───────────────────┐
//!            ▼                                       ▼
//!      [Producer conn]                         [Viewer conn]
//!      relay.handle()  ──► registry.forward() ──► outbound queue ──► socket
//! ```
//!
//! Each session is its own point of serialization. The relay never holds a
//! participant handle; it addresses peers through the registry by
//! [`ConnectionId`], so nothing outlives a deregistration.

pub mod config;
pub mod entry;
pub mod error;
pub mod participant;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Forwarded, Registration, SessionEntry, SessionPhase, SessionSnapshot};
pub use error::RegistryError;
pub use participant::{ConnectionId, Delivery, ParticipantHandle};
pub use store::SessionRegistry;
