//! Participant connections owned by the registry

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::protocol::{Role, ServerMessage};

/// Identifier of a single signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of handing a message to a participant's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the connection's writer
    Queued,
    /// Outbound queue full, message dropped
    Dropped,
    /// The connection's writer is gone
    Closed,
}

/// A participant's slot occupant
///
/// Handles live inside the registry only; everything outside refers to a
/// participant by its [`ConnectionId`].
#[derive(Debug)]
pub struct ParticipantHandle {
    id: ConnectionId,
    role: Role,
    tx: mpsc::Sender<ServerMessage>,
    /// Metadata announced with the join
    metadata: Option<Value>,
    pub(super) last_activity: Instant,
}

impl ParticipantHandle {
    /// Create a handle around a connection's outbound queue
    pub fn new(id: ConnectionId, role: Role, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            role,
            tx,
            metadata: None,
            last_activity: Instant::now(),
        }
    }

    /// Attach join metadata
    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// A connection is alive while its writer still holds the receiver
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a message without waiting
    pub(super) fn deliver(&self, msg: ServerMessage) -> Delivery {
        match self.tx.try_send(msg) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection = %self.id,
                    role = %self.role,
                    kind = msg.kind(),
                    "Outbound queue full, dropping message"
                );
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
