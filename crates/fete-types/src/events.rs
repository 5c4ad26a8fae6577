use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent from the server to chat WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Sent once after the upgrade completes
    #[serde(rename_all = "camelCase")]
    Ready { connection_id: Uuid },

    /// A message was persisted to a room the client has joined
    NewMessage(Message),

    /// Another room member started or stopped typing
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        user_name: String,
        is_typing: bool,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Commands sent FROM client TO server over the chat WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Subscribe this connection to a chat room
    JoinChat(String),

    /// Unsubscribe this connection from a chat room
    LeaveChat(String),

    /// Typing indicator relayed to the other room members
    Typing(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
    pub is_typing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_chat_wire_format() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"event":"joinChat","data":"chat_1_abc"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::JoinChat(id) if id == "chat_1_abc"));
    }

    #[test]
    fn typing_wire_format() {
        let raw = r#"{"event":"typing","data":{"chatId":"c","userId":"u1","userName":"Ana","isTyping":true}}"#;
        match serde_json::from_str::<ClientCommand>(raw).unwrap() {
            ClientCommand::Typing(payload) => {
                assert_eq!(payload.user_id, "u1");
                assert!(payload.is_typing);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn user_typing_is_camel_case() {
        let event = ServerEvent::UserTyping {
            user_id: "u1".into(),
            user_name: "Ana".into(),
            is_typing: false,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "userTyping");
        assert_eq!(value["data"]["isTyping"], false);
        assert_eq!(value["data"]["userName"], "Ana");
    }
}
