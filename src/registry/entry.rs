//! Session entry and state types
//!
//! This module defines the per-session state stored in the registry.

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::{Role, ServerMessage, SessionId};

use super::participant::{ConnectionId, Delivery, ParticipantHandle};

/// Negotiation state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No participants
    Empty,
    /// One participant waiting for the other role
    AwaitingPeer,
    /// Producer and viewer both present
    Paired,
    /// Torn down; the entry is about to leave the registry
    Closed,
}

/// Entry for a single session in the registry
#[derive(Debug)]
pub struct SessionEntry {
    pub id: SessionId,

    /// Producer slot
    producer: Option<ParticipantHandle>,

    /// Viewer slot
    viewer: Option<ParticipantHandle>,

    /// When the session was created
    pub created_at: Instant,

    /// Last negotiation activity from either participant
    pub last_activity: Instant,

    /// Set once the session is torn down; registrations must retry
    pub(super) closed: bool,
}

impl SessionEntry {
    pub(super) fn new(id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            producer: None,
            viewer: None,
            created_at: now,
            last_activity: now,
            closed: false,
        }
    }

    /// Current phase derived from the slots
    pub fn phase(&self) -> SessionPhase {
        if self.closed {
            return SessionPhase::Closed;
        }
        match (&self.producer, &self.viewer) {
            (None, None) => SessionPhase::Empty,
            (Some(_), Some(_)) => SessionPhase::Paired,
            _ => SessionPhase::AwaitingPeer,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.producer.is_none() && self.viewer.is_none()
    }

    pub(super) fn slot(&self, role: Role) -> Option<&ParticipantHandle> {
        match role {
            Role::Producer => self.producer.as_ref(),
            Role::Viewer => self.viewer.as_ref(),
        }
    }

    pub(super) fn slot_mut(&mut self, role: Role) -> &mut Option<ParticipantHandle> {
        match role {
            Role::Producer => &mut self.producer,
            Role::Viewer => &mut self.viewer,
        }
    }

    /// Find the slot held by a connection
    pub(super) fn role_of(&self, connection: ConnectionId) -> Option<Role> {
        [Role::Producer, Role::Viewer]
            .into_iter()
            .find(|role| self.slot(*role).map(|p| p.id()) == Some(connection))
    }

    /// Record activity from a participant
    pub(super) fn touch(&mut self, role: Option<Role>) {
        let now = Instant::now();
        self.last_activity = now;
        if let Some(role) = role {
            if let Some(participant) = self.slot_mut(role).as_mut() {
                participant.last_activity = now;
            }
        }
    }

    /// Send a message to whoever holds `role`
    pub(super) fn notify(&self, role: Role, msg: ServerMessage) -> Option<Delivery> {
        self.slot(role).map(|p| p.deliver(msg))
    }

    /// Time since the last negotiation activity
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub(super) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            phase: self.phase(),
            producer: self.producer.as_ref().map(|p| p.id()),
            viewer: self.viewer.as_ref().map(|p| p.id()),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    /// Drain both slots, leaving the entry closed
    pub(super) fn close(&mut self) -> Vec<ParticipantHandle> {
        self.closed = true;
        self.producer.take().into_iter().chain(self.viewer.take()).collect()
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub phase: SessionPhase,
    pub producer: Option<ConnectionId>,
    pub viewer: Option<ConnectionId>,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl SessionSnapshot {
    pub fn occupant(&self, role: Role) -> Option<ConnectionId> {
        match role {
            Role::Producer => self.producer,
            Role::Viewer => self.viewer,
        }
    }
}

/// Outcome of a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub session_id: SessionId,
    /// Phase after the registration
    pub phase: SessionPhase,
    /// Connection that occupied the slot before and was replaced
    pub replaced: Option<ConnectionId>,
    /// Connection holding the other role, if any
    pub peer: Option<ConnectionId>,
}

/// Outcome of forwarding a message to the other participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    /// Queued for the peer
    Delivered(ConnectionId),
    /// No participant holds the other role
    NoPeer,
    /// The peer's queue was full or its connection is gone
    Undeliverable(ConnectionId),
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn test_phase_follows_slots() {
        let mut entry = SessionEntry::new("s".into());
        assert_eq!(entry.phase(), SessionPhase::Empty);

        let (tx, _rx) = mpsc::channel(4);
        *entry.slot_mut(Role::Producer) =
            Some(ParticipantHandle::new(ConnectionId(1), Role::Producer, tx.clone()));
        assert_eq!(entry.phase(), SessionPhase::AwaitingPeer);
        assert_eq!(entry.role_of(ConnectionId(1)), Some(Role::Producer));

        *entry.slot_mut(Role::Viewer) =
            Some(ParticipantHandle::new(ConnectionId(2), Role::Viewer, tx));
        assert_eq!(entry.phase(), SessionPhase::Paired);

        let drained = entry.close();
        assert_eq!(drained.len(), 2);
        assert_eq!(entry.phase(), SessionPhase::Closed);
        assert!(entry.is_empty());
    }
}
