//! Per-connection WebSocket handling
//!
//! One task reads frames and feeds the relay; a second task drains the
//! participant's outbound queue into the socket and sends keepalive pings.
//! A peer that stays silent past the keepalive timeout is dropped, which
//! releases its session slot.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::server::config::ServerConfig;
use crate::signaling::SignalingRelay;

/// A single signaling connection
pub(crate) struct Connection {
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    relay: Arc<SignalingRelay>,
}

impl Connection {
    pub(crate) fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        relay: Arc<SignalingRelay>,
    ) -> Self {
        Self {
            socket,
            peer_addr,
            config,
            relay,
        }
    }

    /// Upgrade to WebSocket and relay messages until the peer goes away
    pub(crate) async fn run(self) -> Result<()> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);

        let upgrade = tokio_tungstenite::accept_async_with_config(self.socket, Some(ws_config));
        let ws_stream = tokio::time::timeout(self.config.handshake_timeout, upgrade)
            .await
            .map_err(|_| Error::Timeout("websocket handshake"))??;

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (mut participant, mut outbound) = self.relay.open();
        let connection_id = participant.id();

        tracing::debug!(
            connection = %connection_id,
            peer = %self.peer_addr,
            "WebSocket established"
        );

        let ping_period = self.config.ping_interval.max(Duration::from_millis(1));
        let keepalive_timeout = self.config.keepalive_timeout;

        let writer = tokio::spawn(async move {
            let mut ping = tokio::time::interval_at(Instant::now() + ping_period, ping_period);
            ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let msg = tokio::select! {
                    msg = outbound.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                    _ = ping.tick() => {
                        if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                            tracing::debug!(connection = %connection_id, error = %e, "Ping failed");
                            break;
                        }
                        continue;
                    }
                };

                let text = match msg.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text)).await {
                    tracing::debug!(connection = %connection_id, error = %e, "Send failed");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        loop {
            let frame = match tokio::time::timeout(keepalive_timeout, ws_rx.next()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => {
                    tracing::info!(
                        connection = %connection_id,
                        peer = %self.peer_addr,
                        timeout_ms = keepalive_timeout.as_millis() as u64,
                        "Peer silent past keepalive timeout"
                    );
                    break;
                }
            };

            match frame {
                Ok(Message::Text(text)) => {
                    self.relay.handle_text(&mut participant, &text).await;
                }
                Ok(Message::Binary(data)) => {
                    let text = String::from_utf8_lossy(&data);
                    self.relay.handle_text(&mut participant, &text).await;
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection = %connection_id, "Closed by peer");
                    break;
                }
                // Pongs only refresh the keepalive deadline
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(connection = %connection_id, error = %e, "Read failed");
                    break;
                }
            }
        }

        self.relay.close(&mut participant).await;
        drop(participant);
        writer.abort();

        Ok(())
    }
}
