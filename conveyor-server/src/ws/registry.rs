//! Observer connection registry
//!
//! Tracks OPEN observer connections per job, enforces the per-job cap and
//! fans snapshots out. Each connection is fed through its own bounded
//! channel; the socket's writer task drains it. Removing a connection drops
//! its sender, which ends the writer task and closes the socket.
//!
//! Snapshots can arrive out of order (a worker push racing a server-side
//! cancel). The registry remembers the newest `generated_at` broadcast per
//! observed job and drops anything older.

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use conveyor_core::domain::snapshot::StatusSnapshot;
use conveyor_core::dto::observer::{CLOSE_POLICY_VIOLATION, CLOSE_TRY_AGAIN_LATER, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use super::access::{AccessPolicy, Credentials};

/// WebSocket close code for a server going away
const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("missing or unknown credentials")]
    Unauthorized,

    #[error("not allowed to observe job {0}")]
    Forbidden(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job lookup failed: {0}")]
    Lookup(String),

    #[error("job {job_id} already has {max} observers, try again later")]
    Capacity { job_id: String, max: usize },
}

impl AttachError {
    /// WebSocket close code to send alongside the error
    pub fn close_code(&self) -> u16 {
        match self {
            AttachError::Capacity { .. } => CLOSE_TRY_AGAIN_LATER,
            _ => CLOSE_POLICY_VIOLATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub max_connections_per_job: usize,
    pub heartbeat_timeout: Duration,
    /// Messages buffered per connection before a write counts as failed
    pub outbound_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections_per_job: 5,
            heartbeat_timeout: Duration::from_secs(60),
            outbound_buffer: 64,
        }
    }
}

/// A successful attach: the connection ID plus the queue its writer drains
pub struct Attached {
    pub connection_id: String,
    pub receiver: mpsc::Receiver<Message>,
}

struct Connection {
    sender: mpsc::Sender<Message>,
    last_heartbeat: Instant,
}

#[derive(Default)]
struct Connections {
    /// job ID -> connection ID -> connection
    by_job: HashMap<String, HashMap<String, Connection>>,
    /// connection ID -> job ID
    index: HashMap<String, String>,
    /// job ID -> newest snapshot broadcast, kept while the job has observers
    latest: HashMap<String, DateTime<Utc>>,
}

impl Connections {
    fn remove(&mut self, connection_id: &str) -> Option<Connection> {
        let job_id = self.index.remove(connection_id)?;
        let conns = self.by_job.get_mut(&job_id)?;
        let conn = conns.remove(connection_id);
        if conns.is_empty() {
            self.by_job.remove(&job_id);
            self.latest.remove(&job_id);
        }
        conn
    }
}

pub struct ConnectionRegistry {
    policy: Arc<dyn AccessPolicy>,
    config: RegistryConfig,
    connections: RwLock<Connections>,
}

impl ConnectionRegistry {
    pub fn new(policy: Arc<dyn AccessPolicy>, config: RegistryConfig) -> Self {
        Self {
            policy,
            config,
            connections: RwLock::new(Connections::default()),
        }
    }

    /// Registers an observer for a job after the access and capacity checks.
    pub async fn attach(
        &self,
        job_id: &str,
        credentials: &Credentials,
    ) -> Result<Attached, AttachError> {
        self.policy.authorize(credentials, job_id).await?;

        let mut conns = self.connections.write().await;
        let open = conns.by_job.get(job_id).map_or(0, HashMap::len);
        if open >= self.config.max_connections_per_job {
            warn!(job_id = %job_id, open, "Observer rejected, job at capacity");
            return Err(AttachError::Capacity {
                job_id: job_id.to_string(),
                max: self.config.max_connections_per_job,
            });
        }

        let connection_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(self.config.outbound_buffer.max(1));
        conns
            .by_job
            .entry(job_id.to_string())
            .or_default()
            .insert(
                connection_id.clone(),
                Connection {
                    sender,
                    last_heartbeat: Instant::now(),
                },
            );
        conns.index.insert(connection_id.clone(), job_id.to_string());

        info!(job_id = %job_id, conn_id = %connection_id, open = open + 1, "Observer attached");
        Ok(Attached {
            connection_id,
            receiver,
        })
    }

    /// Sends a snapshot to every OPEN connection of the job.
    ///
    /// A connection whose queue is closed or full is removed; the rest still
    /// receive the snapshot. A snapshot older than the last one broadcast for
    /// the job is dropped. Returns the number of connections reached.
    pub async fn broadcast(&self, job_id: &str, snapshot: &StatusSnapshot) -> usize {
        {
            let mut conns = self.connections.write().await;
            if !conns.by_job.contains_key(job_id) {
                return 0;
            }
            if conns
                .latest
                .get(job_id)
                .is_some_and(|newest| *newest > snapshot.generated_at)
            {
                debug!(job_id = %job_id, status = %snapshot.status, "Dropped stale snapshot");
                return 0;
            }
            conns.latest.insert(job_id.to_string(), snapshot.generated_at);
        }

        let message = match encode(&ServerMessage::JobUpdate {
            snapshot: snapshot.clone(),
        }) {
            Some(message) => message,
            None => return 0,
        };

        let mut failed = Vec::new();
        let mut delivered = 0;
        {
            let conns = self.connections.read().await;
            let Some(observers) = conns.by_job.get(job_id) else {
                return 0;
            };

            for (conn_id, conn) in observers {
                if conn.sender.try_send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    failed.push(conn_id.clone());
                }
            }
        }

        if !failed.is_empty() {
            let mut conns = self.connections.write().await;
            for conn_id in &failed {
                conns.remove(conn_id);
                debug!(job_id = %job_id, conn_id = %conn_id, "Removed observer after failed write");
            }
        }

        debug!(job_id = %job_id, status = %snapshot.status, delivered, "Broadcast snapshot");
        delivered
    }

    /// Queues a message for one connection; a failed write removes it
    pub async fn send(&self, connection_id: &str, message: &ServerMessage) -> bool {
        let Some(message) = encode(message) else {
            return false;
        };

        let sent = {
            let conns = self.connections.read().await;
            conns
                .index
                .get(connection_id)
                .and_then(|job_id| conns.by_job.get(job_id))
                .and_then(|observers| observers.get(connection_id))
                .is_some_and(|conn| conn.sender.try_send(message).is_ok())
        };

        if !sent {
            self.disconnect(connection_id).await;
        }
        sent
    }

    /// Removes a connection. Returns `false` if it was already gone.
    pub async fn disconnect(&self, connection_id: &str) -> bool {
        let removed = self.connections.write().await.remove(connection_id).is_some();
        if removed {
            debug!(conn_id = %connection_id, "Observer disconnected");
        }
        removed
    }

    /// Marks a connection as alive (pong frame or client ping)
    pub async fn record_heartbeat(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        let Some(job_id) = conns.index.get(connection_id).cloned() else {
            return;
        };
        if let Some(conn) = conns
            .by_job
            .get_mut(&job_id)
            .and_then(|observers| observers.get_mut(connection_id))
        {
            conn.last_heartbeat = Instant::now();
        }
    }

    /// Closes and removes connections silent for longer than the heartbeat
    /// timeout. Returns the removed connection IDs.
    pub async fn sweep_stale(&self) -> Vec<String> {
        let timeout = self.config.heartbeat_timeout;
        let now = Instant::now();

        let mut conns = self.connections.write().await;
        let stale: Vec<String> = conns
            .by_job
            .values()
            .flat_map(|observers| observers.iter())
            .filter(|(_, conn)| now.duration_since(conn.last_heartbeat) > timeout)
            .map(|(conn_id, _)| conn_id.clone())
            .collect();

        for conn_id in &stale {
            if let Some(conn) = conns.remove(conn_id) {
                let _ = conn.sender.try_send(close_message(
                    CLOSE_POLICY_VIOLATION,
                    "heartbeat timeout",
                ));
            }
            info!(conn_id = %conn_id, "Observer timed out");
        }

        stale
    }

    /// Sends a Ping frame to every connection
    pub async fn ping_all(&self) {
        let failed: Vec<String> = {
            let conns = self.connections.read().await;
            conns
                .by_job
                .values()
                .flat_map(|observers| observers.iter())
                .filter(|(_, conn)| conn.sender.try_send(Message::Ping(Bytes::new())).is_err())
                .map(|(conn_id, _)| conn_id.clone())
                .collect()
        };

        if !failed.is_empty() {
            let mut conns = self.connections.write().await;
            for conn_id in &failed {
                conns.remove(conn_id);
            }
        }
    }

    pub async fn state(&self, connection_id: &str) -> ConnectionState {
        if self.connections.read().await.index.contains_key(connection_id) {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Number of OPEN connections observing a job
    pub async fn connection_count(&self, job_id: &str) -> usize {
        self.connections
            .read()
            .await
            .by_job
            .get(job_id)
            .map_or(0, HashMap::len)
    }

    /// Number of OPEN connections across all jobs
    pub async fn total_connections(&self) -> usize {
        self.connections.read().await.index.len()
    }

    /// Send a Close frame to every connection, then clear the registry.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.index.len();
        for conn in conns.by_job.values().flat_map(|observers| observers.values()) {
            let _ = conn
                .sender
                .try_send(close_message(CLOSE_GOING_AWAY, "server shutting down"));
        }
        conns.by_job.clear();
        conns.index.clear();
        conns.latest.clear();
        info!(count, "Closed all observer connections");
    }
}

pub(crate) fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode observer message: {}", e);
            None
        }
    }
}

pub(crate) fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}
