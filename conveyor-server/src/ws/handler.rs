use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use conveyor_core::dto::observer::{CLOSE_POLICY_VIOLATION, ClientMessage, ServerMessage};
use conveyor_store::status;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::access::Credentials;
use super::registry::{close_message, encode};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws
/// Upgrades to an observer socket. Credentials come from `?token=` or an
/// `Authorization: Bearer` header.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = query.token.or_else(|| bearer_token(&headers));
    ws.on_upgrade(move |socket| handle_socket(socket, state, Credentials { token }))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

/// Manage a single observer socket after upgrade.
///
///   1. Waits for the subscribe message.
///   2. Attaches to the registry (access + capacity checks).
///   3. Spawns a writer task draining the registry's queue for this socket.
///   4. Processes inbound heartbeats until the socket or the registry ends it.
async fn handle_socket(socket: WebSocket, state: AppState, credentials: Credentials) {
    let (mut sink, mut stream) = socket.split();

    let subscribe = tokio::time::timeout(
        state.config.subscribe_timeout,
        wait_for_subscribe(&mut stream),
    )
    .await;

    let job_id = match subscribe {
        Ok(Ok(job_id)) => job_id,
        Ok(Err(reason)) => {
            reject(&mut sink, &reason, CLOSE_POLICY_VIOLATION).await;
            return;
        }
        Err(_) => {
            reject(&mut sink, "subscribe timeout", CLOSE_POLICY_VIOLATION).await;
            return;
        }
    };

    let attached = match state.registry.attach(&job_id, &credentials).await {
        Ok(attached) => attached,
        Err(e) => {
            tracing::info!(job_id = %job_id, "Observer rejected: {}", e);
            reject(&mut sink, &e.to_string(), e.close_code()).await;
            return;
        }
    };

    let conn_id = attached.connection_id;
    let mut rx = attached.receiver;

    // Writer: forward queued messages; ends when the registry drops the sender.
    let writer_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %writer_conn_id, "WebSocket sink closed");
                return;
            }
            if closing {
                return;
            }
        }
        let _ = sink.close().await;
    });

    state
        .registry
        .send(
            &conn_id,
            &ServerMessage::ConnectionEstablished {
                connection_id: conn_id.clone(),
                job_id: job_id.clone(),
            },
        )
        .await;

    match status::snapshot(state.store.as_ref(), &job_id, state.weighting()).await {
        Ok(snapshot) => {
            state
                .registry
                .send(&conn_id, &ServerMessage::JobUpdate { snapshot })
                .await;
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, "Failed to build initial snapshot: {}", e);
        }
    }

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                    state.registry.record_heartbeat(&conn_id).await;
                }
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Ping) => {
                            state.registry.record_heartbeat(&conn_id).await;
                            state.registry.send(&conn_id, &ServerMessage::Pong).await;
                        }
                        Ok(ClientMessage::Subscribe { .. }) => {
                            state
                                .registry
                                .send(
                                    &conn_id,
                                    &ServerMessage::Error {
                                        message: "already subscribed".to_string(),
                                    },
                                )
                                .await;
                        }
                        Err(e) => {
                            tracing::debug!(conn_id = %conn_id, "Ignoring malformed message: {}", e);
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    }

    state.registry.disconnect(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "Observer disconnected");
}

/// Reads until the client names the job it wants to observe.
/// Client pings before subscribing are ignored.
async fn wait_for_subscribe(stream: &mut SplitStream<WebSocket>) -> Result<String, String> {
    while let Some(inbound) = stream.next().await {
        match inbound {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { job_id }) => return Ok(job_id),
                Ok(ClientMessage::Ping) => continue,
                Err(_) => return Err("expected a subscribe message".to_string()),
            },
            Ok(Message::Close(_)) => return Err("closed before subscribing".to_string()),
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
    Err("closed before subscribing".to_string())
}

async fn reject(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    reason: &str,
    code: u16,
) {
    if let Some(error) = encode(&ServerMessage::Error {
        message: reason.to_string(),
    }) {
        let _ = sink.send(error).await;
    }
    let _ = sink.send(close_message(code, reason)).await;
}
