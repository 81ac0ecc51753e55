//! End-to-end tests for the observer WebSocket protocol.
//!
//! Each test serves the real router on an ephemeral port and talks to it with
//! a tungstenite client.

use conveyor_core::domain::job::JobStatus;
use conveyor_core::dto::job::CreateJob;
use conveyor_core::dto::observer::{
    CLOSE_POLICY_VIOLATION, CLOSE_TRY_AGAIN_LATER, ClientMessage, ServerMessage,
};
use conveyor_server::config::Config;
use conveyor_server::ws::{ConnectionRegistry, OwnerAccessPolicy, RegistryConfig, start_heartbeat};
use conveyor_server::{AppState, create_router};
use conveyor_store::{JobStore, MemoryStore, status};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TOKEN: &str = "alice-token";

fn build_state(registry_config: RegistryConfig, subscribe_timeout: Duration) -> AppState {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let tokens = HashMap::from([(TOKEN.to_string(), "alice".to_string())]);
    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(OwnerAccessPolicy::new(tokens.clone(), Arc::clone(&store))),
        registry_config,
    ));

    let config = Config {
        internal_api_key: "internal-secret".to_string(),
        observer_tokens: tokens,
        subscribe_timeout,
        ..Config::default()
    };

    AppState {
        store,
        registry,
        config: Arc::new(config),
    }
}

fn default_state() -> AppState {
    build_state(RegistryConfig::default(), Duration::from_secs(10))
}

async fn serve(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn create_job(state: &AppState) -> String {
    state
        .store
        .create_job(CreateJob {
            name: "quarterly report".to_string(),
            job_type: "document".to_string(),
            owner_id: "alice".to_string(),
            input: serde_json::Value::Null,
            steps: vec!["extract_text".to_string(), "summarize".to_string()],
            metadata: Default::default(),
        })
        .await
        .unwrap()
        .job
        .id
}

async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (socket, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

async fn send_message(socket: &mut Socket, message: &ClientMessage) {
    let json = serde_json::to_string(message).unwrap();
    socket.send(Message::Text(json.into())).await.unwrap();
}

/// Next data or close frame, skipping heartbeat frames
async fn next_frame(socket: &mut Socket) -> Message {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended without a close frame")
            .expect("socket error");

        if !matches!(frame, Message::Ping(_) | Message::Pong(_)) {
            return frame;
        }
    }
}

async fn next_message(socket: &mut Socket) -> ServerMessage {
    match next_frame(socket).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

async fn expect_close(socket: &mut Socket, code: u16) {
    match next_frame(socket).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), code),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

async fn expect_rejection(socket: &mut Socket, code: u16) -> String {
    let message = match next_message(socket).await {
        ServerMessage::Error { message } => message,
        other => panic!("expected an error message, got {:?}", other),
    };
    expect_close(socket, code).await;
    message
}

/// Connects and subscribes, consuming the handshake and initial snapshot
async fn subscribe(addr: SocketAddr, job_id: &str) -> Socket {
    let mut socket = connect(addr, TOKEN).await;
    send_message(
        &mut socket,
        &ClientMessage::Subscribe {
            job_id: job_id.to_string(),
        },
    )
    .await;

    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::ConnectionEstablished { .. }
    ));
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::JobUpdate { .. }
    ));
    socket
}

#[tokio::test]
async fn test_subscribe_sends_handshake_before_snapshot() {
    let state = default_state();
    let job_id = create_job(&state).await;
    let addr = serve(state.clone()).await;

    let mut socket = connect(addr, TOKEN).await;
    send_message(
        &mut socket,
        &ClientMessage::Subscribe {
            job_id: job_id.clone(),
        },
    )
    .await;

    match next_message(&mut socket).await {
        ServerMessage::ConnectionEstablished {
            job_id: established,
            connection_id,
        } => {
            assert_eq!(established, job_id);
            assert!(!connection_id.is_empty());
        }
        other => panic!("expected connection_established, got {:?}", other),
    }

    match next_message(&mut socket).await {
        ServerMessage::JobUpdate { snapshot } => {
            assert_eq!(snapshot.job_id, job_id);
            assert_eq!(snapshot.status, JobStatus::Pending);
            assert_eq!(snapshot.steps.len(), 2);
        }
        other => panic!("expected job_update, got {:?}", other),
    }

    // Later broadcasts reach the socket
    let snapshot = status::snapshot(state.store.as_ref(), &job_id, state.weighting())
        .await
        .unwrap();
    assert_eq!(state.registry.broadcast(&job_id, &snapshot).await, 1);
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::JobUpdate { .. }
    ));
}

#[tokio::test]
async fn test_client_ping_gets_pong() {
    let state = default_state();
    let job_id = create_job(&state).await;
    let addr = serve(state).await;

    let mut socket = subscribe(addr, &job_id).await;
    send_message(&mut socket, &ClientMessage::Ping).await;

    assert_eq!(next_message(&mut socket).await, ServerMessage::Pong);
}

#[tokio::test]
async fn test_unknown_token_is_rejected_with_policy_violation() {
    let state = default_state();
    let job_id = create_job(&state).await;
    let addr = serve(state.clone()).await;

    let mut socket = connect(addr, "mallory-token").await;
    send_message(&mut socket, &ClientMessage::Subscribe { job_id: job_id.clone() }).await;

    expect_rejection(&mut socket, CLOSE_POLICY_VIOLATION).await;
    assert_eq!(state.registry.connection_count(&job_id).await, 0);
}

#[tokio::test]
async fn test_unknown_job_is_rejected_with_policy_violation() {
    let state = default_state();
    let addr = serve(state).await;

    let mut socket = connect(addr, TOKEN).await;
    send_message(
        &mut socket,
        &ClientMessage::Subscribe {
            job_id: "does-not-exist".to_string(),
        },
    )
    .await;

    let message = expect_rejection(&mut socket, CLOSE_POLICY_VIOLATION).await;
    assert!(message.contains("not found"));
}

#[tokio::test]
async fn test_observer_over_capacity_is_told_to_try_again_later() {
    let state = build_state(
        RegistryConfig {
            max_connections_per_job: 1,
            ..RegistryConfig::default()
        },
        Duration::from_secs(10),
    );
    let job_id = create_job(&state).await;
    let addr = serve(state.clone()).await;

    let mut first = subscribe(addr, &job_id).await;

    let mut second = connect(addr, TOKEN).await;
    send_message(&mut second, &ClientMessage::Subscribe { job_id: job_id.clone() }).await;
    expect_rejection(&mut second, CLOSE_TRY_AGAIN_LATER).await;

    // The admitted observer is unaffected
    assert_eq!(state.registry.connection_count(&job_id).await, 1);
    send_message(&mut first, &ClientMessage::Ping).await;
    assert_eq!(next_message(&mut first).await, ServerMessage::Pong);
}

#[tokio::test]
async fn test_missing_subscribe_times_out() {
    let state = build_state(RegistryConfig::default(), Duration::from_millis(100));
    let addr = serve(state).await;

    let mut socket = connect(addr, TOKEN).await;

    let message = expect_rejection(&mut socket, CLOSE_POLICY_VIOLATION).await;
    assert_eq!(message, "subscribe timeout");
}

#[tokio::test]
async fn test_heartbeat_pings_and_drops_silent_observer() {
    let state = build_state(
        RegistryConfig {
            heartbeat_timeout: Duration::from_millis(200),
            ..RegistryConfig::default()
        },
        Duration::from_secs(10),
    );
    let job_id = create_job(&state).await;
    let addr = serve(state.clone()).await;

    let mut live = subscribe(addr, &job_id).await;
    let mut silent = subscribe(addr, &job_id).await;
    let heartbeat = start_heartbeat(Arc::clone(&state.registry), Duration::from_millis(50));

    // Reading lets the client answer pings; `silent` is never read meanwhile
    let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
    let mut pings = 0;
    while let Ok(frame) = tokio::time::timeout_at(deadline, live.next()).await {
        match frame {
            Some(Ok(Message::Ping(_))) => pings += 1,
            other => panic!("unexpected frame on live observer: {:?}", other),
        }
    }

    assert!(pings > 0);
    assert_eq!(state.registry.connection_count(&job_id).await, 1);
    expect_close(&mut silent, CLOSE_POLICY_VIOLATION).await;

    heartbeat.abort();
}
