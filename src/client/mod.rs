//! Signaling client
//!
//! Connects to a relay over WebSocket, with bounded retry, and speaks the
//! participant side of the protocol.

pub mod config;
pub mod connector;
pub mod retry;

pub use config::ClientConfig;
pub use connector::SignalingClient;
pub use retry::RetryPolicy;
