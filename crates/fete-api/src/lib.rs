pub mod auth;
pub mod bookings;
pub mod chat;
pub mod error;
pub mod events;
pub mod extract;
pub mod faq;
pub mod middleware;
pub mod payments;
pub mod state;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use fete_types::api::{Envelope, HealthBody};

use crate::middleware::{optional_auth, require_auth, require_staff};
use crate::state::AppState;

pub use state::{AppStateInner, with_db};

/// Every REST and WebSocket route under `/api`. Transport layers (CORS,
/// tracing) are added by the server.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/events", get(events::list_events))
        .route("/events/categories/stats", get(events::category_stats))
        .route("/events/{id}", get(events::get_event))
        .route("/payments/webhook", post(payments::webhook))
        .route("/chat/assistant/welcome", get(chat::welcome))
        .route("/chat/ws", get(chat::ws_upgrade))
        .route("/chat/{chat_id}", get(chat::history))
        .route("/chat/{chat_id}/assistant", post(chat::assistant));

    let guest_or_user = Router::new()
        .route("/chat/{chat_id}/messages", post(chat::send_message))
        .layer(from_fn_with_state(state.clone(), optional_auth));

    let authenticated = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/users/{id}/role", put(auth::set_role))
        .route("/bookings", get(bookings::list_bookings).post(bookings::create_booking))
        .route("/bookings/{id}", get(bookings::get_booking).put(bookings::update_booking))
        .route("/payments/create-payment-intent", post(payments::create_payment_intent))
        .route("/payments/confirm-payment", post(payments::confirm_payment))
        .route("/payments/booking/{id}", get(payments::booking_payment))
        .route("/chat/{chat_id}/messages/{message_id}/read", put(chat::mark_read))
        .layer(from_fn_with_state(state.clone(), require_auth));

    // require_staff reads the claims require_auth inserted, so it sits inside.
    let staff = Router::new()
        .route("/events", post(events::create_event))
        .route("/events/{id}", put(events::update_event).delete(events::delete_event))
        .route("/bookings/{id}/assign", put(bookings::assign_planner))
        .route("/bookings/{id}/status", put(bookings::update_status))
        .route("/chat/active", get(chat::active_chats))
        .layer(from_fn(require_staff))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .merge(public)
        .merge(guest_or_user)
        .merge(authenticated)
        .merge(staff)
        .route("/health", get(health));

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(Envelope::ok(HealthBody {
        message: "Event Planner API is running".into(),
        timestamp: Utc::now(),
    }))
}

async fn not_found() -> impl IntoResponse {
    let body = serde_json::json!({ "success": false, "message": "Route not found" });
    (StatusCode::NOT_FOUND, Json(body))
}
