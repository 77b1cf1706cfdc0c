//! Registry error types

use crate::protocol::{ErrorCode, Role, SessionId};

use super::participant::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The role is held by a live connection
    #[error("{role} slot of session {session} is occupied")]
    SlotOccupied { session: SessionId, role: Role },

    /// Session not found
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The connection does not hold a slot in the session
    #[error("{connection} is not a participant of session {session}")]
    NotParticipant {
        session: SessionId,
        connection: ConnectionId,
    },
}

impl RegistryError {
    /// Code reported to the participant whose request failed
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::SlotOccupied { .. } => ErrorCode::SlotOccupied,
            RegistryError::NotFound(_) => ErrorCode::NotFound,
            RegistryError::NotParticipant { .. } => ErrorCode::NotJoined,
        }
    }
}
