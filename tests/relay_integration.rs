//! End-to-end signaling over real WebSocket connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message;

use rtc_overlay::protocol::PeerInfo;
use rtc_overlay::registry::SessionPhase;
use rtc_overlay::{
    ClientConfig, Error, ErrorCode, RelayServer, RetryPolicy, Role, ServerConfig, ServerMessage,
    SessionId, SignalingClient,
};

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    server: Arc<RelayServer>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|config| config).await
    }

    async fn start_with(configure: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RelayServer::new(configure(ServerConfig::with_addr(addr))));
        let (shutdown, rx) = oneshot::channel::<()>();

        let serving = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = serving
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        Self {
            addr,
            server,
            shutdown: Some(shutdown),
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    async fn client(&self) -> SignalingClient {
        let config = ClientConfig::new(self.url())
            .retry(RetryPolicy::default().max_attempts(3))
            .connect_timeout(WAIT);
        SignalingClient::connect(config).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn session(id: &str) -> SessionId {
    SessionId::new(id)
}

#[tokio::test]
async fn test_late_joiner_sees_joined_before_any_offer() {
    let server = TestServer::start().await;
    let sid = session("late-joiner");

    let mut producer = server.client().await;
    let joined = assert_ok!(
        producer
            .join(
                Some(sid.clone()),
                Role::Producer,
                Some(json!({"cameraType": "environment"}))
            )
            .await
    );
    assert!(matches!(joined, ServerMessage::Joined { peer: None, .. }));

    // Nobody to receive this one; it is dropped
    assert_ok!(producer.offer(sid.clone(), json!({"sdp": "v=0 early"})).await);

    let mut viewer = server.client().await;
    viewer
        .send(&rtc_overlay::ClientMessage::Join {
            session_id: Some(sid.clone()),
            role: Role::Viewer,
            payload: None,
            force: false,
        })
        .await
        .unwrap();

    let first = viewer.recv_timeout(WAIT).await.unwrap();
    match first {
        ServerMessage::Joined {
            session_id,
            role,
            peer,
        } => {
            assert_eq!(session_id, sid);
            assert_eq!(role, Role::Viewer);
            assert_eq!(
                peer,
                Some(PeerInfo {
                    role: Role::Producer,
                    payload: Some(json!({"cameraType": "environment"})),
                })
            );
        }
        other => panic!("expected joined, got {other:?}"),
    }

    let announced = producer.recv_timeout(WAIT).await.unwrap();
    assert!(matches!(
        announced,
        ServerMessage::PeerJoined {
            role: Role::Viewer,
            ..
        }
    ));

    // Renegotiation after peer-joined reaches the viewer verbatim
    producer
        .offer(sid.clone(), json!({"sdp": "v=0 real"}))
        .await
        .unwrap();
    let offer = viewer.recv_timeout(WAIT).await.unwrap();
    assert_eq!(
        offer,
        ServerMessage::Offer {
            session_id: sid.clone(),
            payload: json!({"sdp": "v=0 real"}),
        }
    );

    viewer
        .answer(sid.clone(), json!({"sdp": "v=0 answer"}))
        .await
        .unwrap();
    let answer = producer.recv_timeout(WAIT).await.unwrap();
    assert_eq!(answer.kind(), "answer");

    for i in 0..5 {
        producer
            .ice_candidate(sid.clone(), json!({"candidate": i}))
            .await
            .unwrap();
    }
    for i in 0..5 {
        let msg = viewer.recv_timeout(WAIT).await.unwrap();
        assert_eq!(
            msg,
            ServerMessage::IceCandidate {
                session_id: sid.clone(),
                payload: json!({"candidate": i}),
            }
        );
    }
}

#[tokio::test]
async fn test_producer_reconnects_without_viewer_rejoining() {
    let server = TestServer::start().await;
    let sid = session("reconnect");

    let mut producer = server.client().await;
    producer
        .join(Some(sid.clone()), Role::Producer, None)
        .await
        .unwrap();

    let mut viewer = server.client().await;
    viewer
        .join(Some(sid.clone()), Role::Viewer, None)
        .await
        .unwrap();
    assert_eq!(
        producer.recv_timeout(WAIT).await.unwrap().kind(),
        "peer-joined"
    );

    producer.close().await.unwrap();
    let left = viewer.recv_timeout(WAIT).await.unwrap();
    assert!(matches!(
        left,
        ServerMessage::PeerLeft {
            role: Role::Producer,
            ..
        }
    ));

    let mut producer = server.client().await;
    let joined = producer
        .join(Some(sid.clone()), Role::Producer, None)
        .await
        .unwrap();
    assert!(matches!(
        joined,
        ServerMessage::Joined {
            peer: Some(PeerInfo {
                role: Role::Viewer,
                ..
            }),
            ..
        }
    ));

    let rejoined = viewer.recv_timeout(WAIT).await.unwrap();
    assert!(matches!(
        rejoined,
        ServerMessage::PeerJoined {
            role: Role::Producer,
            ..
        }
    ));

    let snapshot = server.server.registry().lookup(&sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Paired);
}

#[tokio::test]
async fn test_silent_producer_loses_its_slot() {
    let server = TestServer::start_with(|config| {
        config
            .ping_interval(Duration::from_millis(50))
            .keepalive_timeout(Duration::from_millis(300))
    })
    .await;
    let sid = session("half-open");

    // Joins, then never reads again, so the server's pings go unanswered
    let (mut stale, _) = tokio_tungstenite::connect_async(server.url()).await.unwrap();
    stale
        .send(Message::Text(
            r#"{"type":"join","sessionId":"half-open","role":"producer"}"#.into(),
        ))
        .await
        .unwrap();
    loop {
        let frame = tokio::time::timeout(WAIT, stale.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            assert_eq!(ServerMessage::from_json(&text).unwrap().kind(), "joined");
            break;
        }
    }

    let mut early = server.client().await;
    let rejected = early.join(Some(sid.clone()), Role::Producer, None).await;
    assert!(matches!(
        rejected,
        Err(Error::Rejected {
            code: ErrorCode::SlotOccupied,
            ..
        })
    ));

    tokio::time::sleep(Duration::from_millis(800)).await;

    let mut producer = server.client().await;
    let joined = assert_ok!(producer.join(Some(sid.clone()), Role::Producer, None).await);
    assert!(matches!(joined, ServerMessage::Joined { .. }));

    drop(stale);
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let server = TestServer::start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.url()).await.unwrap();

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let reply = tokio::time::timeout(WAIT, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply = ServerMessage::from_json(reply.to_text().unwrap()).unwrap();
    assert!(matches!(
        reply,
        ServerMessage::Error {
            code: ErrorCode::MalformedMessage,
            ..
        }
    ));

    ws.send(Message::Text(
        r#"{"type":"join","sessionId":"still-open","role":"viewer"}"#.into(),
    ))
    .await
    .unwrap();
    let reply = tokio::time::timeout(WAIT, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let reply = ServerMessage::from_json(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply.kind(), "joined");
}

#[tokio::test]
async fn test_occupied_slot_and_forced_eviction() {
    let server = TestServer::start().await;
    let sid = session("occupied");

    let mut first = server.client().await;
    first
        .join(Some(sid.clone()), Role::Producer, None)
        .await
        .unwrap();

    let mut second = server.client().await;
    let rejected = second.join(Some(sid.clone()), Role::Producer, None).await;
    assert!(matches!(
        rejected,
        Err(Error::Rejected {
            code: ErrorCode::SlotOccupied,
            ..
        })
    ));

    let joined = second.force_join(sid.clone(), Role::Producer).await;
    assert_ok!(joined);

    let evicted = first.recv_timeout(WAIT).await.unwrap();
    assert_eq!(
        evicted,
        ServerMessage::Evicted {
            session_id: sid.clone(),
            role: Role::Producer,
        }
    );
}

#[tokio::test]
async fn test_generated_session_id() {
    let server = TestServer::start().await;
    let mut producer = server.client().await;

    let joined = producer.join(None, Role::Producer, None).await.unwrap();
    let ServerMessage::Joined { session_id, .. } = joined else {
        panic!("expected joined");
    };
    assert!(!session_id.is_empty());

    let mut viewer = server.client().await;
    viewer
        .join(Some(session_id.clone()), Role::Viewer, None)
        .await
        .unwrap();
    assert_eq!(server.server.registry().session_count().await, 1);
}

#[tokio::test]
async fn test_connect_gives_up_after_bounded_retries() {
    // Reserve a port and release it so nothing is listening there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(format!("ws://{addr}/")).retry(
        RetryPolicy::default()
            .max_attempts(2)
            .initial_backoff(Duration::from_millis(10)),
    );

    match SignalingClient::connect(config).await {
        Err(Error::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connected to a closed port"),
    }
}
