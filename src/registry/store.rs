//! Session registry implementation
//!
//! The authoritative map of session ids to their producer and viewer slots.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::protocol::{PeerInfo, Role, ServerMessage, SessionId};

use super::config::RegistryConfig;
use super::entry::{Forwarded, Registration, SessionEntry, SessionPhase, SessionSnapshot};
use super::error::RegistryError;
use super::participant::{ConnectionId, Delivery, ParticipantHandle};

/// Central registry for all active sessions
///
/// The outer `RwLock` only guards insertion and removal of sessions. Every
/// state transition happens under the session's own `Mutex`, so unrelated
/// sessions never contend and no await happens while a session is locked.
pub struct SessionRegistry {
    /// Map of session id to session entry
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionEntry>>>>,

    /// Configuration
    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    async fn get(&self, id: &SessionId) -> Option<Arc<Mutex<SessionEntry>>> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn get_or_create(&self, id: &SessionId) -> Arc<Mutex<SessionEntry>> {
        if let Some(entry) = self.get(id).await {
            return entry;
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(session = %id, "Session created");
            Arc::new(Mutex::new(SessionEntry::new(id.clone())))
        }))
    }

    /// Remove a closed entry, unless it was already replaced
    async fn discard(&self, id: &SessionId, entry: &Arc<Mutex<SessionEntry>>) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(id).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            sessions.remove(id);
            tracing::info!(session = %id, "Session destroyed");
        }
    }

    /// Register a participant in a session slot
    ///
    /// Creates the session if it is unseen. A slot held by a dead connection
    /// is silently taken over; a slot held by a live connection fails with
    /// [`RegistryError::SlotOccupied`] unless `force` is set, in which case
    /// the occupant is told it was evicted.
    ///
    /// The joiner is acknowledged with `joined`, and an already present peer
    /// receives `peer-joined`, before the session is released.
    pub async fn register(
        &self,
        session_id: &SessionId,
        participant: ParticipantHandle,
        force: bool,
    ) -> Result<Registration, RegistryError> {
        loop {
            let entry_arc = self.get_or_create(session_id).await;
            let mut entry = entry_arc.lock().await;

            if entry.closed {
                // Lost a race with teardown; start over on a fresh entry
                drop(entry);
                self.discard(session_id, &entry_arc).await;
                continue;
            }

            let role = participant.role();
            let joiner = participant.id();
            let mut replaced = None;
            let mut rejoin = false;

            if let Some(current) = entry.slot(role) {
                if current.id() == joiner {
                    rejoin = true;
                } else if current.is_alive() && !force {
                    tracing::warn!(
                        session = %session_id,
                        role = %role,
                        occupant = %current.id(),
                        rejected = %joiner,
                        "Slot occupied by live connection"
                    );
                    return Err(RegistryError::SlotOccupied {
                        session: session_id.clone(),
                        role,
                    });
                }
            }

            if !rejoin {
                if let Some(previous) = entry.slot_mut(role).take() {
                    if previous.is_alive() {
                        previous.deliver(ServerMessage::Evicted {
                            session_id: session_id.clone(),
                            role,
                        });
                        tracing::info!(
                            session = %session_id,
                            role = %role,
                            evicted = %previous.id(),
                            "Live occupant evicted"
                        );
                    } else {
                        tracing::info!(
                            session = %session_id,
                            role = %role,
                            previous = %previous.id(),
                            "Replacing dead occupant"
                        );
                    }
                    replaced = Some(previous.id());
                }
            }

            let metadata = participant.metadata().cloned();
            *entry.slot_mut(role) = Some(participant);
            entry.touch(Some(role));

            let peer = entry.slot(role.peer()).map(|p| {
                (
                    p.id(),
                    PeerInfo {
                        role: p.role(),
                        payload: p.metadata().cloned(),
                    },
                )
            });

            entry.notify(
                role,
                ServerMessage::Joined {
                    session_id: session_id.clone(),
                    role,
                    peer: peer.as_ref().map(|(_, info)| info.clone()),
                },
            );

            if peer.is_some() && !rejoin {
                entry.notify(
                    role.peer(),
                    ServerMessage::PeerJoined {
                        session_id: session_id.clone(),
                        role,
                        payload: metadata,
                    },
                );
            }

            let phase = entry.phase();
            tracing::info!(
                session = %session_id,
                role = %role,
                connection = %joiner,
                phase = ?phase,
                "Participant registered"
            );

            return Ok(Registration {
                session_id: session_id.clone(),
                phase,
                replaced,
                peer: peer.map(|(id, _)| id),
            });
        }
    }

    /// Remove a connection from its slot
    ///
    /// The remaining participant receives `peer-left`. A session left with
    /// both slots empty is destroyed. Returns the phase after removal, or
    /// `None` when the connection held no slot in the session.
    pub async fn deregister(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
    ) -> Option<SessionPhase> {
        let entry_arc = self.get(session_id).await?;
        let mut entry = entry_arc.lock().await;

        let Some(role) = entry.role_of(connection) else {
            tracing::debug!(
                session = %session_id,
                connection = %connection,
                "Deregister for non-occupant ignored"
            );
            return None;
        };

        entry.slot_mut(role).take();
        entry.notify(
            role.peer(),
            ServerMessage::PeerLeft {
                session_id: session_id.clone(),
                role,
            },
        );

        let phase = if entry.is_empty() {
            entry.close();
            SessionPhase::Closed
        } else {
            entry.phase()
        };
        drop(entry);

        tracing::info!(
            session = %session_id,
            role = %role,
            connection = %connection,
            phase = ?phase,
            "Participant deregistered"
        );

        if phase == SessionPhase::Closed {
            self.discard(session_id, &entry_arc).await;
        }

        Some(phase)
    }

    /// Get a snapshot of a session
    pub async fn lookup(&self, session_id: &SessionId) -> Result<SessionSnapshot, RegistryError> {
        let entry_arc = self
            .get(session_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(session_id.clone()))?;

        let entry = entry_arc.lock().await;
        if entry.closed {
            return Err(RegistryError::NotFound(session_id.clone()));
        }
        Ok(entry.snapshot())
    }

    /// The other participant of a session, if any
    pub async fn peers_of(
        &self,
        session_id: &SessionId,
        excluding: ConnectionId,
    ) -> Option<ConnectionId> {
        let entry_arc = self.get(session_id).await?;
        let entry = entry_arc.lock().await;

        let role = entry.role_of(excluding)?;
        entry.slot(role.peer()).map(|p| p.id())
    }

    /// Forward a message from one participant to the other
    ///
    /// Delivery happens while the session is held, so messages from one
    /// sender reach the peer in the order they were forwarded.
    pub async fn forward(
        &self,
        session_id: &SessionId,
        from: ConnectionId,
        msg: ServerMessage,
    ) -> Result<Forwarded, RegistryError> {
        let entry_arc = self
            .get(session_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(session_id.clone()))?;

        let mut entry = entry_arc.lock().await;
        if entry.closed {
            return Err(RegistryError::NotFound(session_id.clone()));
        }

        let role = entry
            .role_of(from)
            .ok_or_else(|| RegistryError::NotParticipant {
                session: session_id.clone(),
                connection: from,
            })?;
        entry.touch(Some(role));

        let forwarded = match entry.slot(role.peer()) {
            None => Forwarded::NoPeer,
            Some(peer) => match peer.deliver(msg) {
                Delivery::Queued => Forwarded::Delivered(peer.id()),
                Delivery::Dropped | Delivery::Closed => Forwarded::Undeliverable(peer.id()),
            },
        };

        Ok(forwarded)
    }

    /// Record negotiation activity for a participant
    pub async fn touch(
        &self,
        session_id: &SessionId,
        connection: ConnectionId,
    ) -> Result<(), RegistryError> {
        let entry_arc = self
            .get(session_id)
            .await
            .ok_or_else(|| RegistryError::NotFound(session_id.clone()))?;

        let mut entry = entry_arc.lock().await;
        let role = entry.role_of(connection);
        entry.touch(role);
        Ok(())
    }

    /// Get total number of sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Run cleanup once
    ///
    /// Tears down sessions with no negotiation activity for longer than
    /// `idle_timeout`. Remaining participants receive `session-closed`.
    /// Sessions busy with a transition are skipped until the next pass.
    pub async fn cleanup(&self) {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let expired: Vec<SessionId> = sessions
            .iter()
            .filter_map(|(id, entry_arc)| {
                let mut entry = entry_arc.try_lock().ok()?;

                if entry.closed {
                    return Some(id.clone());
                }
                if entry.idle_for(now) <= idle_timeout {
                    return None;
                }

                for participant in entry.close() {
                    participant.deliver(ServerMessage::SessionClosed {
                        session_id: id.clone(),
                        reason: "idle-timeout".into(),
                    });
                }
                Some(id.clone())
            })
            .collect();

        for id in expired {
            sessions.remove(&id);
            tracing::info!(session = %id, "Session removed by cleanup");
        }
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry
            .config
            .cleanup_interval
            .max(std::time::Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn participant(
        id: u64,
        role: Role,
    ) -> (ParticipantHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(32);
        (ParticipantHandle::new(ConnectionId(id), role, tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_register_pairs_and_announces() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (producer, mut producer_rx) = participant(1, Role::Producer);
        let producer = producer.with_metadata(Some(json!({"cameraType": "rear"})));
        let reg = registry.register(&session, producer, false).await.unwrap();
        assert_eq!(reg.phase, SessionPhase::AwaitingPeer);
        assert!(reg.peer.is_none());

        let (viewer, mut viewer_rx) = participant(2, Role::Viewer);
        let reg = registry.register(&session, viewer, false).await.unwrap();
        assert_eq!(reg.phase, SessionPhase::Paired);
        assert_eq!(reg.peer, Some(ConnectionId(1)));

        let producer_msgs = drain(&mut producer_rx);
        assert_eq!(producer_msgs.len(), 2);
        assert_eq!(producer_msgs[0].kind(), "joined");
        assert_eq!(
            producer_msgs[1],
            ServerMessage::PeerJoined {
                session_id: session.clone(),
                role: Role::Viewer,
                payload: None,
            }
        );

        // The late joiner learns about the producer and its metadata
        match drain(&mut viewer_rx).as_slice() {
            [ServerMessage::Joined { peer: Some(peer), .. }] => {
                assert_eq!(peer.role, Role::Producer);
                assert_eq!(peer.payload, Some(json!({"cameraType": "rear"})));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slot_occupied_by_live_connection() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (first, _first_rx) = participant(1, Role::Producer);
        assert_ok!(registry.register(&session, first, false).await);

        let (second, _second_rx) = participant(2, Role::Producer);
        let result = registry.register(&session, second, false).await;
        assert!(matches!(
            result,
            Err(RegistryError::SlotOccupied {
                role: Role::Producer,
                ..
            })
        ));

        let snapshot = registry.lookup(&session).await.unwrap();
        assert_eq!(snapshot.producer, Some(ConnectionId(1)));
    }

    #[tokio::test]
    async fn test_dead_occupant_replaced_silently() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (stale, stale_rx) = participant(1, Role::Producer);
        registry.register(&session, stale, false).await.unwrap();
        drop(stale_rx);

        let (fresh, _fresh_rx) = participant(2, Role::Producer);
        let reg = registry.register(&session, fresh, false).await.unwrap();
        assert_eq!(reg.replaced, Some(ConnectionId(1)));

        let snapshot = registry.lookup(&session).await.unwrap();
        assert_eq!(snapshot.producer, Some(ConnectionId(2)));
    }

    #[tokio::test]
    async fn test_force_evicts_live_occupant() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (first, mut first_rx) = participant(1, Role::Viewer);
        registry.register(&session, first, false).await.unwrap();
        drain(&mut first_rx);

        let (second, _second_rx) = participant(2, Role::Viewer);
        let reg = registry.register(&session, second, true).await.unwrap();
        assert_eq!(reg.replaced, Some(ConnectionId(1)));

        assert_eq!(
            drain(&mut first_rx),
            vec![ServerMessage::Evicted {
                session_id: session.clone(),
                role: Role::Viewer,
            }]
        );
    }

    #[tokio::test]
    async fn test_deregister_notifies_peer_and_destroys_empty() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (producer, _producer_rx) = participant(1, Role::Producer);
        let (viewer, mut viewer_rx) = participant(2, Role::Viewer);
        registry.register(&session, producer, false).await.unwrap();
        registry.register(&session, viewer, false).await.unwrap();
        drain(&mut viewer_rx);

        let phase = registry.deregister(&session, ConnectionId(1)).await;
        assert_eq!(phase, Some(SessionPhase::AwaitingPeer));
        assert_eq!(
            drain(&mut viewer_rx),
            vec![ServerMessage::PeerLeft {
                session_id: session.clone(),
                role: Role::Producer,
            }]
        );

        // Unknown connection is a no-op
        assert_eq!(registry.deregister(&session, ConnectionId(99)).await, None);

        let phase = registry.deregister(&session, ConnectionId(2)).await;
        assert_eq!(phase, Some(SessionPhase::Closed));
        assert_eq!(registry.session_count().await, 0);
        assert_err!(registry.lookup(&session).await);
    }

    #[tokio::test]
    async fn test_forward_and_peers_of() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (producer, _producer_rx) = participant(1, Role::Producer);
        registry.register(&session, producer, false).await.unwrap();

        let offer = ServerMessage::Offer {
            session_id: session.clone(),
            payload: json!({"sdp": "v=0"}),
        };
        let result = registry.forward(&session, ConnectionId(1), offer.clone()).await;
        assert_eq!(result, Ok(Forwarded::NoPeer));
        assert_eq!(registry.peers_of(&session, ConnectionId(1)).await, None);

        let (viewer, mut viewer_rx) = participant(2, Role::Viewer);
        registry.register(&session, viewer, false).await.unwrap();
        drain(&mut viewer_rx);

        let result = registry.forward(&session, ConnectionId(1), offer.clone()).await;
        assert_eq!(result, Ok(Forwarded::Delivered(ConnectionId(2))));
        assert_eq!(drain(&mut viewer_rx), vec![offer.clone()]);
        assert_eq!(
            registry.peers_of(&session, ConnectionId(2)).await,
            Some(ConnectionId(1))
        );

        let outsider = registry.forward(&session, ConnectionId(7), offer).await;
        assert!(matches!(outsider, Err(RegistryError::NotParticipant { .. })));
    }

    #[tokio::test]
    async fn test_reconnect_reaches_paired_again() {
        let registry = SessionRegistry::new();
        let session = SessionId::new("room");

        let (producer, producer_rx) = participant(1, Role::Producer);
        let (viewer, mut viewer_rx) = participant(2, Role::Viewer);
        registry.register(&session, producer, false).await.unwrap();
        registry.register(&session, viewer, false).await.unwrap();

        // Transport drop
        drop(producer_rx);
        registry.deregister(&session, ConnectionId(1)).await;
        drain(&mut viewer_rx);

        let (producer, _producer_rx) = participant(3, Role::Producer);
        let reg = registry.register(&session, producer, false).await.unwrap();
        assert_eq!(reg.phase, SessionPhase::Paired);

        let msgs = drain(&mut viewer_rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind(), "peer-joined");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_tears_down_idle_sessions() {
        let config = RegistryConfig::default().idle_timeout(Duration::from_secs(10));
        let registry = SessionRegistry::with_config(config);

        let idle = SessionId::new("idle");
        let (producer, mut producer_rx) = participant(1, Role::Producer);
        registry.register(&idle, producer, false).await.unwrap();
        drain(&mut producer_rx);

        tokio::time::advance(Duration::from_secs(11)).await;

        let busy = SessionId::new("busy");
        let (viewer, _viewer_rx) = participant(2, Role::Viewer);
        registry.register(&busy, viewer, false).await.unwrap();

        registry.cleanup().await;

        assert_eq!(registry.session_count().await, 1);
        assert_err!(registry.lookup(&idle).await);
        assert_ok!(registry.lookup(&busy).await);
        assert_eq!(
            drain(&mut producer_rx),
            vec![ServerMessage::SessionClosed {
                session_id: idle.clone(),
                reason: "idle-timeout".into(),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_single_winner() {
        let registry = Arc::new(SessionRegistry::new());

        for round in 0..20u64 {
            let session = SessionId::new(format!("race-{}", round));
            let mut receivers = Vec::new();
            let mut tasks = Vec::new();

            for n in 0..8u64 {
                let (handle, rx) = participant(round * 100 + n, Role::Producer);
                receivers.push(rx);
                let registry = Arc::clone(&registry);
                let session = session.clone();
                tasks.push(tokio::spawn(async move {
                    registry.register(&session, handle, false).await.is_ok()
                }));
            }

            let mut winners = 0;
            for task in tasks {
                if task.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1, "round {}", round);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_randomized_register_deregister_keeps_slots_consistent() {
        let registry = Arc::new(SessionRegistry::new());
        let sessions: Vec<SessionId> = (0..3).map(|i| SessionId::new(format!("s{}", i))).collect();

        let mut tasks = Vec::new();
        for worker in 0..8u64 {
            let registry = Arc::clone(&registry);
            let sessions = sessions.clone();
            tasks.push(tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(worker);
                let mut roles = HashMap::new();
                let mut held: Vec<(SessionId, ConnectionId, mpsc::Receiver<ServerMessage>)> =
                    Vec::new();

                for step in 0..200u64 {
                    if !held.is_empty() && rng.random_bool(0.4) {
                        let idx = rng.random_range(0..held.len());
                        let (session, id, _rx) = held.swap_remove(idx);
                        registry.deregister(&session, id).await;
                        continue;
                    }

                    let session = sessions[rng.random_range(0..sessions.len())].clone();
                    let role = if rng.random_bool(0.5) {
                        Role::Producer
                    } else {
                        Role::Viewer
                    };
                    let id = ConnectionId(worker * 10_000 + step);
                    let (tx, rx) = mpsc::channel(256);
                    let handle = ParticipantHandle::new(id, role, tx);
                    roles.insert(id, role);

                    if registry
                        .register(&session, handle, rng.random_bool(0.2))
                        .await
                        .is_ok()
                    {
                        held.push((session, id, rx));
                    }
                }
                (roles, held)
            }));
        }

        let mut roles = HashMap::new();
        let mut live = Vec::new();
        for task in tasks {
            let (worker_roles, held) = task.await.unwrap();
            roles.extend(worker_roles);
            live.push(held);
        }

        for session in &sessions {
            let Ok(snapshot) = registry.lookup(session).await else {
                continue;
            };
            assert_ne!(snapshot.phase, SessionPhase::Closed);
            if let (Some(p), Some(v)) = (snapshot.producer, snapshot.viewer) {
                assert_ne!(p, v);
            }
            for role in [Role::Producer, Role::Viewer] {
                if let Some(occupant) = snapshot.occupant(role) {
                    assert_eq!(roles.get(&occupant), Some(&role));
                }
            }
        }
    }
}
