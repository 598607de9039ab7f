//! Client → Server messages

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // Generation
    /// Request a new generation for `text`
    Message {
        text: String,
    },
    /// Request cancellation of the active generation
    StopGeneration,

    // History
    ClearHistory,
    GetHistory,

    // Keepalive
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

impl ClientMessage {
    /// Wire name of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Message { .. } => "message",
            ClientMessage::StopGeneration => "stop_generation",
            ClientMessage::ClearHistory => "clear_history",
            ClientMessage::GetHistory => "get_history",
            ClientMessage::Ping { .. } => "ping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClientMessage;

    #[test]
    fn serializes_message_with_type_tag() {
        let msg = ClientMessage::Message {
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "message", "text": "hello"}));
    }

    #[test]
    fn unit_variants_carry_only_the_tag() {
        let json = serde_json::to_string(&ClientMessage::StopGeneration).expect("serialize");
        assert_eq!(json, r#"{"type":"stop_generation"}"#);

        let json = serde_json::to_string(&ClientMessage::ClearHistory).expect("serialize");
        assert_eq!(json, r#"{"type":"clear_history"}"#);
    }

    #[test]
    fn deserializes_ping_without_timestamp() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).expect("deserialize");
        assert_eq!(msg, ClientMessage::Ping { timestamp: None });
    }

    #[test]
    fn rejects_unknown_type() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"edit_message","id":1}"#);
        assert!(result.is_err());
    }
}
