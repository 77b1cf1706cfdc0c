//! Connection-side participant state

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::{ErrorCode, Role, ServerMessage, SessionId};
use crate::registry::ConnectionId;

/// State the relay keeps for one open signaling connection
///
/// Owned by the connection's task. The registry holds its own handle to the
/// outbound queue once the participant has joined.
#[derive(Debug)]
pub struct Participant {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    joined: Option<(SessionId, Role)>,
}

impl Participant {
    pub(super) fn new(id: ConnectionId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            tx,
            joined: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Session and role this connection last joined
    pub fn joined(&self) -> Option<&(SessionId, Role)> {
        self.joined.as_ref()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.joined.as_ref().map(|(id, _)| id)
    }

    pub(super) fn set_joined(&mut self, session_id: SessionId, role: Role) {
        self.joined = Some((session_id, role));
    }

    pub(super) fn take_joined(&mut self) -> Option<(SessionId, Role)> {
        self.joined.take()
    }

    pub(super) fn sender(&self) -> mpsc::Sender<ServerMessage> {
        self.tx.clone()
    }

    /// Send a message back to this connection only
    pub(super) fn reply(&self, msg: ServerMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection = %self.id,
                    kind = msg.kind(),
                    "Outbound queue full, dropping reply"
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    pub(super) fn reply_error(
        &self,
        session_id: Option<SessionId>,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        self.reply(ServerMessage::error(session_id, code, message));
    }
}
