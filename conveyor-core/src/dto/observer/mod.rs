//! Observer protocol messages
//!
//! JSON frames exchanged with WebSocket observers, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::domain::snapshot::StatusSnapshot;

/// Close code for authorization and lookup failures
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code when a job already has the maximum number of observers
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { job_id: String },
    Ping,
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        connection_id: String,
        job_id: String,
    },
    JobUpdate {
        snapshot: StatusSnapshot,
    },
    Error {
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","job_id":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                job_id: "abc".to_string()
            }
        );

        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);
    }

    #[test]
    fn test_server_message_wire_format() {
        let json = serde_json::to_value(ServerMessage::Error {
            message: "job not found".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "job not found");

        let json = serde_json::to_value(ServerMessage::ConnectionEstablished {
            connection_id: "c1".to_string(),
            job_id: "j1".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "connection_established");
    }
}
