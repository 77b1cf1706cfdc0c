//! Message routing between the two participants of a session

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ErrorCode, Role, ServerMessage, SessionId};
use crate::registry::{
    ConnectionId, Forwarded, ParticipantHandle, RegistryError, SessionPhase, SessionRegistry,
};

use super::participant::Participant;

/// Default capacity of each connection's outbound queue
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// What the relay did with an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Joined a session, now in the given phase
    Joined(SessionId, SessionPhase),
    /// Left a session (or was not in one)
    Left,
    /// Negotiation message handed to the registry for the peer
    Routed(Forwarded),
    /// Rejected; an error was sent back to the sender
    Rejected(ErrorCode),
}

/// Signaling relay
///
/// Transport agnostic: a front-end (see [`crate::server`]) opens a
/// [`Participant`] per connection, feeds it inbound text, and writes out
/// whatever arrives on the participant's outbound receiver.
pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
    next_connection_id: AtomicU64,
    outbound_capacity: usize,
}

impl SignalingRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_outbound_capacity(registry, DEFAULT_OUTBOUND_CAPACITY)
    }

    pub fn with_outbound_capacity(registry: Arc<SessionRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            next_connection_id: AtomicU64::new(1),
            outbound_capacity: capacity.max(1),
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a new participant connection
    ///
    /// Returns the participant state and the receiver its writer drains.
    pub fn open(&self) -> (Participant, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        tracing::debug!(connection = %id, "Participant opened");
        (Participant::new(id, tx), rx)
    }

    /// Handle one inbound text frame
    ///
    /// A frame that does not parse is dropped and reported to its sender;
    /// the connection stays usable.
    pub async fn handle_text(&self, participant: &mut Participant, text: &str) -> Outcome {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.handle(participant, msg).await,
            Err(e) => {
                tracing::debug!(
                    connection = %participant.id(),
                    error = %e,
                    "Malformed message dropped"
                );
                participant.reply_error(
                    participant.session_id().cloned(),
                    ErrorCode::MalformedMessage,
                    e.to_string(),
                );
                Outcome::Rejected(ErrorCode::MalformedMessage)
            }
        }
    }

    /// Handle one parsed message
    pub async fn handle(&self, participant: &mut Participant, msg: ClientMessage) -> Outcome {
        tracing::debug!(
            connection = %participant.id(),
            kind = msg.kind(),
            session = ?msg.session_id().map(|s| s.as_str()),
            "Inbound message"
        );

        match msg {
            ClientMessage::Join {
                session_id,
                role,
                payload,
                force,
            } => {
                let session_id = session_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(SessionId::generate);
                self.join(participant, session_id, role, payload, force).await
            }
            ClientMessage::Leave { session_id } => self.leave(participant, &session_id).await,
            negotiation @ (ClientMessage::Offer { .. }
            | ClientMessage::Answer { .. }
            | ClientMessage::IceCandidate { .. }) => self.route(participant, negotiation).await,
        }
    }

    /// Transport closed: release the participant's slot immediately
    pub async fn close(&self, participant: &mut Participant) {
        if let Some((session_id, role)) = participant.take_joined() {
            tracing::info!(
                session = %session_id,
                role = %role,
                connection = %participant.id(),
                "Transport closed"
            );
            self.registry
                .deregister(&session_id, participant.id())
                .await;
        }
    }

    async fn join(
        &self,
        participant: &mut Participant,
        session_id: SessionId,
        role: Role,
        payload: Option<serde_json::Value>,
        force: bool,
    ) -> Outcome {
        // Moving to another session or role releases the current slot first
        if let Some((current, current_role)) = participant.joined().cloned() {
            if current != session_id || current_role != role {
                participant.take_joined();
                self.registry.deregister(&current, participant.id()).await;
            }
        }

        let handle = ParticipantHandle::new(participant.id(), role, participant.sender())
            .with_metadata(payload);

        match self.registry.register(&session_id, handle, force).await {
            Ok(registration) => {
                participant.set_joined(session_id.clone(), role);
                Outcome::Joined(session_id, registration.phase)
            }
            Err(e) => {
                participant.take_joined();
                participant.reply_error(Some(session_id), e.code(), e.to_string());
                Outcome::Rejected(e.code())
            }
        }
    }

    async fn leave(&self, participant: &mut Participant, session_id: &SessionId) -> Outcome {
        match participant.session_id().cloned() {
            None => Outcome::Left,
            Some(current) if &current != session_id => {
                participant.reply_error(
                    Some(session_id.clone()),
                    ErrorCode::SessionMismatch,
                    format!("joined {}, not {}", current, session_id),
                );
                Outcome::Rejected(ErrorCode::SessionMismatch)
            }
            Some(_) => {
                participant.take_joined();
                self.registry.deregister(session_id, participant.id()).await;
                Outcome::Left
            }
        }
    }

    async fn route(&self, participant: &mut Participant, msg: ClientMessage) -> Outcome {
        let kind = msg.kind();
        let Some(target) = msg.session_id().cloned() else {
            return Outcome::Rejected(ErrorCode::MalformedMessage);
        };

        let Some(joined) = participant.session_id().cloned() else {
            participant.reply_error(
                Some(target),
                ErrorCode::NotJoined,
                format!("{} before join", kind),
            );
            return Outcome::Rejected(ErrorCode::NotJoined);
        };

        if joined != target {
            participant.reply_error(
                Some(target.clone()),
                ErrorCode::SessionMismatch,
                format!("joined {}, not {}", joined, target),
            );
            return Outcome::Rejected(ErrorCode::SessionMismatch);
        }

        let Some(forwarded) = msg.into_forwarded() else {
            return Outcome::Rejected(ErrorCode::MalformedMessage);
        };

        match self
            .registry
            .forward(&target, participant.id(), forwarded)
            .await
        {
            Ok(outcome) => {
                match outcome {
                    Forwarded::Delivered(peer) => {
                        tracing::debug!(session = %target, kind, to = %peer, "Forwarded");
                    }
                    Forwarded::NoPeer => {
                        tracing::info!(
                            session = %target,
                            kind,
                            from = %participant.id(),
                            "No peer present, message dropped"
                        );
                    }
                    Forwarded::Undeliverable(peer) => {
                        tracing::warn!(
                            session = %target,
                            kind,
                            to = %peer,
                            "Peer unreachable, message dropped"
                        );
                    }
                }
                Outcome::Routed(outcome)
            }
            Err(e) => {
                // Session expired or this connection was evicted
                participant.take_joined();
                let code = match e {
                    RegistryError::NotParticipant { .. } => ErrorCode::NotJoined,
                    _ => e.code(),
                };
                participant.reply_error(Some(target), code, e.to_string());
                Outcome::Rejected(code)
            }
        }
    }
}
