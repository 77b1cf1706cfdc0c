//! Crate-level error types

use crate::protocol::ErrorCode;
use crate::registry::RegistryError;
use crate::scheduler::EngineError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding or decoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session registry rejected an operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Annotation engine failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A bounded retry loop ran out of attempts
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Timed out waiting for the peer
    #[error("timed out: {0}")]
    Timeout(&'static str),

    /// The request conflicts with one already in progress
    #[error("busy: {0}")]
    Busy(&'static str),

    /// The other end of an internal channel went away
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The relay answered a request with an error message
    #[error("rejected by relay ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    /// The remote side violated the signaling protocol
    #[error("protocol error: {0}")]
    Protocol(String),
}
