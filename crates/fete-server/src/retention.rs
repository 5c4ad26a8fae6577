use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use fete_api::state::{AppState, with_db};

/// Background task that deletes chats idle for longer than `retention_days`.
pub async fn run_retention_loop(state: AppState, retention_days: u32, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match prune_stale_chats(&state, Utc::now(), retention_days).await {
            Ok(count) => {
                if count > 0 {
                    info!("Retention: removed {} messages from idle chats", count);
                }
            }
            Err(e) => {
                warn!("Retention error: {}", e);
            }
        }
    }
}

async fn prune_stale_chats(state: &AppState, now: DateTime<Utc>, retention_days: u32) -> fete_api::error::ApiResult<usize> {
    // A window reaching past the earliest representable time keeps everything
    let Some(cutoff) = retention_cutoff(now, retention_days) else {
        return Ok(0);
    };
    with_db(state, move |s| Ok(s.db.delete_stale_chats(cutoff)?)).await
}

fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(retention_days)).and_then(|window| now.checked_sub_signed(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fete_api::AppStateInner;
    use fete_db::{Database, NewMessage};
    use fete_gateway::Dispatcher;
    use fete_payments::mock::MockGateway;
    use fete_types::models::{MessageType, SenderType};
    use uuid::Uuid;

    fn state_with_message() -> AppState {
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test".into(),
            dispatcher: Dispatcher::new(),
            payments: Arc::new(MockGateway::new()),
            webhook_secret: None,
        });
        let message = NewMessage {
            id: Uuid::new_v4(),
            chat_id: "chat_old".into(),
            sender: None,
            sender_type: SenderType::Guest,
            sender_name: "Gus".into(),
            sender_email: Some("gus@example.com".into()),
            content: "Still there?".into(),
            message_type: MessageType::Text,
            attachments: Vec::new(),
        };
        state.db.insert_message(&message, |_| {}).unwrap();
        state
    }

    #[tokio::test]
    async fn recent_chats_survive() {
        let state = state_with_message();
        assert_eq!(prune_stale_chats(&state, Utc::now(), 1).await.unwrap(), 0);
        assert_eq!(state.db.get_messages("chat_old", 0, 10).unwrap().1, 1);
    }

    #[tokio::test]
    async fn idle_chats_are_removed() {
        let state = state_with_message();
        let later = Utc::now() + chrono::Duration::days(3);
        assert_eq!(prune_stale_chats(&state, later, 1).await.unwrap(), 1);
        assert_eq!(state.db.get_messages("chat_old", 0, 10).unwrap().1, 0);
    }

    #[tokio::test]
    async fn huge_window_keeps_everything() {
        let state = state_with_message();
        assert!(retention_cutoff(Utc::now(), u32::MAX).is_none());
        assert_eq!(prune_stale_chats(&state, Utc::now(), u32::MAX).await.unwrap(), 0);
        assert_eq!(state.db.get_messages("chat_old", 0, 10).unwrap().1, 1);
    }
}
