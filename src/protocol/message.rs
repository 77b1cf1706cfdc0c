//! Negotiation message types
//!
//! Every message on the signaling channel is a JSON object tagged by `type`:
//!
//! ```text
//! Client -> Relay                          Relay -> Client
//!   join          {sessionId?, role,         joined        {sessionId, role, peer?}
//!                  payload?, force?}         peer-joined   {sessionId, role, payload?}
//!   offer         {sessionId, payload}       peer-left     {sessionId, role}
//!   answer        {sessionId, payload}       offer / answer / ice-candidate (forwarded)
//!   ice-candidate {sessionId, payload}       evicted       {sessionId, role}
//!   leave         {sessionId}                session-closed {sessionId, reason}
//!                                            error         {sessionId?, code, message}
//! ```
//!
//! Negotiation payloads are carried as opaque JSON values. The relay moves
//! them between peers without looking inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque session identifier shared by the two peers of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id from a caller-supplied string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random session id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Role of a participant within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Captures and sends the stream
    Producer,
    /// Receives the stream and renders the overlay
    Viewer,
}

impl Role {
    /// The role on the other side of the session
    pub fn peer(self) -> Role {
        match self {
            Role::Producer => Role::Viewer,
            Role::Viewer => Role::Producer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent by participants to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Take a slot in a session (created if unseen, generated if omitted)
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        role: Role,
        /// Metadata announced to the peer (e.g. camera facing)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Evict a live occupant of the same role instead of failing
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        force: bool,
    },
    Offer {
        session_id: SessionId,
        payload: Value,
    },
    Answer {
        session_id: SessionId,
        payload: Value,
    },
    IceCandidate {
        session_id: SessionId,
        payload: Value,
    },
    Leave {
        session_id: SessionId,
    },
}

impl ClientMessage {
    /// Parse a message from its JSON text form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Session the message is addressed to (`None` for a join without id)
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            ClientMessage::Join { session_id, .. } => session_id.as_ref(),
            ClientMessage::Offer { session_id, .. }
            | ClientMessage::Answer { session_id, .. }
            | ClientMessage::IceCandidate { session_id, .. }
            | ClientMessage::Leave { session_id } => Some(session_id),
        }
    }

    /// Message type tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::Leave { .. } => "leave",
        }
    }

    /// Convert a negotiation message into the form delivered to the peer
    ///
    /// Returns `None` for `join` and `leave`, which are never forwarded.
    pub fn into_forwarded(self) -> Option<ServerMessage> {
        match self {
            ClientMessage::Offer {
                session_id,
                payload,
            } => Some(ServerMessage::Offer {
                session_id,
                payload,
            }),
            ClientMessage::Answer {
                session_id,
                payload,
            } => Some(ServerMessage::Answer {
                session_id,
                payload,
            }),
            ClientMessage::IceCandidate {
                session_id,
                payload,
            } => Some(ServerMessage::IceCandidate {
                session_id,
                payload,
            }),
            ClientMessage::Join { .. } | ClientMessage::Leave { .. } => None,
        }
    }
}

/// Description of the participant already present when joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Error codes reported to the sender of a rejected message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The message could not be parsed
    MalformedMessage,
    /// The requested role is held by a live connection
    SlotOccupied,
    /// Negotiation was attempted before joining a session
    NotJoined,
    /// The message names a different session than the one joined
    SessionMismatch,
    /// The session no longer exists
    NotFound,
}

/// Messages sent by the relay to participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Acknowledges a join; carries the generated id when none was given
    Joined {
        session_id: SessionId,
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer: Option<PeerInfo>,
    },
    /// The other role joined; the earlier participant may start negotiating
    PeerJoined {
        session_id: SessionId,
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    PeerLeft {
        session_id: SessionId,
        role: Role,
    },
    Offer {
        session_id: SessionId,
        payload: Value,
    },
    Answer {
        session_id: SessionId,
        payload: Value,
    },
    IceCandidate {
        session_id: SessionId,
        payload: Value,
    },
    /// Another connection force-joined with this participant's role
    Evicted {
        session_id: SessionId,
        role: Role,
    },
    /// The session was torn down by the relay
    SessionClosed {
        session_id: SessionId,
        reason: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Build an error reply
    pub fn error(session_id: Option<SessionId>, code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            session_id,
            code,
            message: message.into(),
        }
    }

    /// Message type tag as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::PeerJoined { .. } => "peer-joined",
            ServerMessage::PeerLeft { .. } => "peer-left",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::Evicted { .. } => "evicted",
            ServerMessage::SessionClosed { .. } => "session-closed",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_join_with_generated_id() {
        let msg = ClientMessage::from_json(r#"{"type":"join","role":"viewer"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                session_id: None,
                role: Role::Viewer,
                payload: None,
                force: false,
            }
        );
        assert!(msg.session_id().is_none());
    }

    #[test]
    fn test_parse_ice_candidate() {
        let text = r#"{"type":"ice-candidate","sessionId":"room1","payload":{"candidate":"a=1"}}"#;
        let msg = ClientMessage::from_json(text).unwrap();

        assert_eq!(msg.kind(), "ice-candidate");
        assert_eq!(msg.session_id(), Some(&SessionId::new("room1")));
    }

    #[test]
    fn test_reject_unknown_type_and_missing_payload() {
        assert!(ClientMessage::from_json(r#"{"type":"frame","sessionId":"x"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"offer","sessionId":"x"}"#).is_err());
        assert!(ClientMessage::from_json(r#"{"type":"join","role":"admin"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_forwarded_payload_is_untouched() {
        let payload = json!({"sdp": "v=0\r\n", "extra": [1, 2, {"k": null}]});
        let msg = ClientMessage::Offer {
            session_id: "s".into(),
            payload: payload.clone(),
        };

        match msg.into_forwarded() {
            Some(ServerMessage::Offer {
                session_id,
                payload: forwarded,
            }) => {
                assert_eq!(session_id.as_str(), "s");
                assert_eq!(forwarded, payload);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let leave = ClientMessage::Leave {
            session_id: "s".into(),
        };
        assert!(leave.into_forwarded().is_none());
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::PeerJoined {
            session_id: "s".into(),
            role: Role::Viewer,
            payload: None,
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "peer-joined", "sessionId": "s", "role": "viewer"}));

        let err = ServerMessage::error(None, ErrorCode::MalformedMessage, "bad");
        let value: Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(value["code"], "malformed-message");
    }

    #[test]
    fn test_role_peer() {
        assert_eq!(Role::Producer.peer(), Role::Viewer);
        assert_eq!(Role::Viewer.peer(), Role::Producer);
    }
}
