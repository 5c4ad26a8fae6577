use axum::{
    Extension, Json,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use fete_db::NewMessage;
use fete_gateway::connection::{self, Identity};
use fete_types::api::{
    ActiveChatsBody, AssistantBody, AssistantRequest, Claims, Envelope, HistoryQuery, MessageDataBody,
    MessageListBody, Pagination, ReadReceiptBody, SendMessageRequest, WelcomeBody,
};
use fete_types::models::{MessageType, SenderType, is_valid_chat_id};

use crate::auth::{decode_token, is_valid_email, normalize_email};
use crate::error::{ApiError, ApiResult};
use crate::events::paging;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::faq;
use crate::middleware::MaybeClaims;
use crate::state::{AppState, with_db};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;
const ACTIVE_CHATS_LIMIT: u32 = 20;
const MAX_CONTENT_CHARS: usize = 5000;

fn checked_chat_id(chat_id: String) -> ApiResult<String> {
    if !is_valid_chat_id(&chat_id) {
        return Err(ApiError::validation("Invalid chat id"));
    }
    Ok(chat_id)
}

fn checked_content(content: &str) -> ApiResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Message content is required"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::validation("Message content is too long"));
    }
    Ok(content.to_string())
}

/// Persist `new` and broadcast it to the room before the connection lock is
/// released, so broadcast order matches history order.
async fn persist_and_publish(state: &AppState, new: NewMessage) -> ApiResult<fete_types::models::Message> {
    with_db(state, move |s| Ok(s.db.insert_message(&new, |m| s.dispatcher.publish_message(m))?)).await
}

pub async fn history(
    State(state): State<AppState>,
    ApiPath(chat_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = checked_chat_id(chat_id)?;
    let (page, limit, offset) = paging(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);

    let (messages, total) = with_db(&state, move |s| Ok(s.db.get_messages(&chat_id, offset, limit)?)).await?;

    Ok(Json(Envelope::ok(MessageListBody { messages, pagination: Pagination::new(page, limit, total) })))
}

pub async fn send_message(
    State(state): State<AppState>,
    MaybeClaims(claims): MaybeClaims,
    ApiPath(chat_id): ApiPath<String>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = checked_chat_id(chat_id)?;
    let content = checked_content(&req.content)?;
    if req.message_type == MessageType::System {
        return Err(ApiError::validation("System messages cannot be sent by clients"));
    }

    let (sender, sender_name, sender_email) = match &claims {
        Some(claims) => (Some(claims.sub), claims.name.clone(), Some(claims.email.clone())),
        None => {
            let name = req.sender_name.as_deref().map(str::trim).unwrap_or_default().to_string();
            let email = req.sender_email.as_deref().map(normalize_email).unwrap_or_default();
            if name.is_empty() || !is_valid_email(&email) {
                return Err(ApiError::validation("Content, sender name, and sender email are required"));
            }
            (None, name, Some(email))
        }
    };

    let new = NewMessage {
        id: Uuid::new_v4(),
        chat_id,
        sender,
        sender_type: SenderType::for_sender(claims.as_ref().map(|c| c.role)),
        sender_name,
        sender_email,
        content,
        message_type: req.message_type,
        attachments: req.attachments,
    };
    let message = persist_and_publish(&state, new).await?;

    debug!("Message {} from {} in {}", message.id, message.sender_type, message.chat_id);
    Ok((StatusCode::CREATED, Json(Envelope::ok(MessageDataBody { data: message }))))
}

/// Run the FAQ responder over a visitor message. The visitor's own message is
/// sent separately through `send_message`; this only produces the bot side.
pub async fn assistant(
    State(state): State<AppState>,
    ApiPath(chat_id): ApiPath<String>,
    ApiJson(req): ApiJson<AssistantRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = checked_chat_id(chat_id)?;
    let content = checked_content(&req.content)?;

    let reply = faq::respond(&content, req.live_mode);
    let message = match reply.content {
        Some(text) => {
            let new = NewMessage {
                id: Uuid::new_v4(),
                chat_id,
                sender: None,
                sender_type: SenderType::Bot,
                sender_name: faq::BOT_NAME.to_string(),
                sender_email: None,
                content: text.to_string(),
                message_type: MessageType::Text,
                attachments: Vec::new(),
            };
            Some(persist_and_publish(&state, new).await?)
        }
        None => None,
    };

    if reply.live_mode && !req.live_mode {
        info!("Chat handed off to live support");
    }
    Ok(Json(Envelope::ok(AssistantBody {
        reply: message,
        live_mode: reply.live_mode,
        typing_delay_ms: faq::TYPING_DELAY_MS,
    })))
}

pub async fn welcome() -> impl IntoResponse {
    Json(Envelope::ok(WelcomeBody { content: faq::WELCOME_MESSAGE.to_string() }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath((chat_id, message_id)): ApiPath<(String, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = checked_chat_id(chat_id)?;
    let reader = claims.sub;

    let message = with_db(&state, move |s| Ok(s.db.mark_read(&chat_id, message_id, reader)?))
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;

    Ok(Json(Envelope::ok(ReadReceiptBody { message })))
}

pub async fn active_chats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let chats = with_db(&state, |s| Ok(s.db.active_chats(ACTIVE_CHATS_LIMIT)?)).await?;
    Ok(Json(Envelope::ok(ActiveChatsBody { chats })))
}

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Upgrade to the chat relay. A token is optional; when present it must be
/// valid and names the connection's typing identity.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WsQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let identity = match query.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let claims = decode_token(&state.jwt_secret, token)
                .map_err(|_| ApiError::Unauthorized("Token is not valid".into()))?;
            Some(Identity { user_id: claims.sub, name: claims.name })
        }
        None => None,
    };

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, identity)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(checked_content("  hi  ").unwrap(), "hi");
        assert!(checked_content("   ").is_err());
        assert!(checked_content(&"x".repeat(MAX_CONTENT_CHARS + 1)).is_err());
    }

    #[test]
    fn chat_id_is_checked() {
        assert!(checked_chat_id("chat_1_abc".into()).is_ok());
        assert!(matches!(checked_chat_id("a b".into()), Err(ApiError::Validation(_))));
    }
}
