//! JSON messages exchanged with viewers over the WebSocket.

use serde::{Deserialize, Serialize};

/// Messages pushed from the coordinator to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Activate { index: i64 },
    Pong,
}

/// Messages sent by viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

impl ServerMessage {
    pub fn activate(index: i64) -> Self {
        ServerMessage::Activate { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activate_matches_wire_shape() {
        let value = serde_json::to_value(ServerMessage::activate(2)).unwrap();
        assert_eq!(value, json!({"type": "activate", "index": 2}));
        let pong = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(pong, json!({"type": "pong"}));
    }

    #[test]
    fn ping_parses_from_client_text() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Ping);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }
}
