//! WebSocket signaling client

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::client::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, Role, ServerMessage, SessionId};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A participant's connection to the relay
pub struct SignalingClient {
    ws: Socket,
    config: ClientConfig,
}

impl SignalingClient {
    /// Connect, retrying according to the configured policy
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let url = config.url.clone();
        let connect_timeout = config.connect_timeout;

        let ws = config
            .retry
            .retry("signaling connect", |attempt| {
                let url = url.clone();
                async move {
                    tracing::debug!(url = %url, attempt = attempt, "Connecting to relay");
                    match tokio::time::timeout(
                        connect_timeout,
                        tokio_tungstenite::connect_async(url.as_str()),
                    )
                    .await
                    {
                        Ok(Ok((ws, _response))) => Ok(ws),
                        Ok(Err(e)) => Err(Error::from(e)),
                        Err(_) => Err(Error::Timeout("signaling connect")),
                    }
                }
            })
            .await?;

        tracing::info!(url = %config.url, "Connected to relay");
        Ok(Self { ws, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let text = msg.to_json()?;
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Next message from the relay
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(ServerMessage::from_json(&text)?),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::ChannelClosed("signaling socket"))
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(Error::Protocol("unexpected binary frame".into()))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<ServerMessage> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| Error::Timeout("signaling message"))?
    }

    /// Join a session and wait for the acknowledgement
    ///
    /// Returns the `joined` message, which carries the session id and the
    /// peer already present, if any.
    pub async fn join(
        &mut self,
        session_id: Option<SessionId>,
        role: Role,
        payload: Option<Value>,
    ) -> Result<ServerMessage> {
        self.send(&ClientMessage::Join {
            session_id,
            role,
            payload,
            force: false,
        })
        .await?;
        self.await_joined().await
    }

    /// Join, evicting a live occupant of the same role
    pub async fn force_join(&mut self, session_id: SessionId, role: Role) -> Result<ServerMessage> {
        self.send(&ClientMessage::Join {
            session_id: Some(session_id),
            role,
            payload: None,
            force: true,
        })
        .await?;
        self.await_joined().await
    }

    pub async fn offer(&mut self, session_id: SessionId, payload: Value) -> Result<()> {
        self.send(&ClientMessage::Offer {
            session_id,
            payload,
        })
        .await
    }

    pub async fn answer(&mut self, session_id: SessionId, payload: Value) -> Result<()> {
        self.send(&ClientMessage::Answer {
            session_id,
            payload,
        })
        .await
    }

    pub async fn ice_candidate(&mut self, session_id: SessionId, payload: Value) -> Result<()> {
        self.send(&ClientMessage::IceCandidate {
            session_id,
            payload,
        })
        .await
    }

    pub async fn leave(&mut self, session_id: SessionId) -> Result<()> {
        self.send(&ClientMessage::Leave { session_id }).await
    }

    /// Close the socket
    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }

    async fn await_joined(&mut self) -> Result<ServerMessage> {
        loop {
            match self.recv().await? {
                joined @ ServerMessage::Joined { .. } => return Ok(joined),
                ServerMessage::Error { code, message, .. } => {
                    return Err(Error::Rejected { code, message })
                }
                other => {
                    tracing::debug!(kind = other.kind(), "Skipping message while joining");
                }
            }
        }
    }
}
