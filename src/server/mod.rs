//! WebSocket front-end for the signaling relay
//!
//! Each accepted socket becomes one relay participant. Text frames carry
//! JSON signaling messages in both directions.

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
