use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use fete_types::events::{ServerEvent, TypingPayload};
use fete_types::models::Message;

use crate::typing::TypingRoster;

/// A serialized event addressed to one chat room.
#[derive(Debug, Clone)]
pub struct RoomEnvelope {
    pub chat_id: String,
    /// Connection the event came from; that connection does not receive it.
    pub origin: Option<Uuid>,
    pub json: Arc<str>,
}

/// Fans chat events out to every connection joined to the room.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection receives every envelope and filters by its joined rooms
    broadcast_tx: broadcast::Sender<RoomEnvelope>,

    /// Typing state: chat_id -> roster
    typing: RwLock<HashMap<String, TypingRoster>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                typing: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEnvelope> {
        self.inner.broadcast_tx.subscribe()
    }

    fn send(&self, chat_id: &str, origin: Option<Uuid>, event: &ServerEvent) {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize event for chat {}: {}", chat_id, e);
                return;
            }
        };
        // No receivers is fine: nobody has joined yet
        let _ = self.inner.broadcast_tx.send(RoomEnvelope {
            chat_id: chat_id.to_string(),
            origin,
            json: json.into(),
        });
    }

    /// Push a persisted message to everyone in its room, sender included.
    /// Synchronous so it can run while the database lock is still held.
    pub fn publish_message(&self, message: &Message) {
        debug!("Broadcasting message {} to chat {}", message.id, message.chat_id);
        self.send(&message.chat_id, None, &ServerEvent::NewMessage(message.clone()));
    }

    /// Record a typing update and relay it to the other room members.
    pub async fn typing(&self, conn_id: Uuid, payload: TypingPayload) {
        {
            let mut rosters = self.inner.typing.write().await;
            let roster = rosters.entry(payload.chat_id.clone()).or_default();
            roster.apply(conn_id, &payload);
            if roster.is_empty() {
                rosters.remove(&payload.chat_id);
            }
        }

        self.send(
            &payload.chat_id,
            Some(conn_id),
            &ServerEvent::UserTyping {
                user_id: payload.user_id,
                user_name: payload.user_name,
                is_typing: payload.is_typing,
            },
        );
    }

    /// Clear the typing entries `conn_id` reported in `chat_id` and tell the
    /// room they stopped.
    pub async fn leave(&self, conn_id: Uuid, chat_id: &str) {
        let removed = {
            let mut rosters = self.inner.typing.write().await;
            let Some(roster) = rosters.get_mut(chat_id) else {
                return;
            };
            let removed = roster.clear_connection(conn_id);
            if roster.is_empty() {
                rosters.remove(chat_id);
            }
            removed
        };

        for (user_id, user_name) in removed {
            self.send(
                chat_id,
                Some(conn_id),
                &ServerEvent::UserTyping { user_id, user_name, is_typing: false },
            );
        }
    }

    /// Who is typing in `chat_id`, as `(user_id, user_name)`.
    pub async fn typing_users(&self, chat_id: &str) -> Vec<(String, String)> {
        self.inner
            .typing
            .read()
            .await
            .get(chat_id)
            .map(|roster| roster.typing())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fete_types::models::{MessageType, SenderType};

    fn payload(chat_id: &str, is_typing: bool) -> TypingPayload {
        TypingPayload {
            chat_id: chat_id.into(),
            user_id: "guest-1".into(),
            user_name: "Guest".into(),
            is_typing,
        }
    }

    #[tokio::test]
    async fn messages_are_addressed_to_their_room() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.publish_message(&Message {
            id: Uuid::new_v4(),
            chat_id: "chat_a".into(),
            sender: None,
            sender_type: SenderType::Guest,
            sender_name: "Guest".into(),
            sender_email: None,
            content: "hi".into(),
            message_type: MessageType::Text,
            attachments: vec![],
            is_read: false,
            read_by: vec![],
            created_at: Utc::now(),
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.chat_id, "chat_a");
        assert!(envelope.origin.is_none());
        assert!(envelope.json.contains("\"newMessage\""));
    }

    #[tokio::test]
    async fn typing_is_tagged_with_its_origin() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let conn = Uuid::new_v4();

        dispatcher.typing(conn, payload("chat_a", true)).await;
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.origin, Some(conn));
        assert!(envelope.json.contains("\"userTyping\""));
        assert_eq!(dispatcher.typing_users("chat_a").await.len(), 1);
    }

    #[tokio::test]
    async fn leaving_clears_and_announces_stop() {
        let dispatcher = Dispatcher::new();
        let conn = Uuid::new_v4();
        dispatcher.typing(conn, payload("chat_a", true)).await;

        let mut rx = dispatcher.subscribe();
        dispatcher.leave(conn, "chat_a").await;

        assert!(dispatcher.typing_users("chat_a").await.is_empty());
        let envelope = rx.recv().await.unwrap();
        assert!(envelope.json.contains("\"isTyping\":false"));
    }
}
