use std::collections::HashMap;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use fete_db::PaidTransition;
use fete_payments::{IntentStatus, WebhookEvent, webhook};
use fete_types::api::{
    Claims, ConfirmPaymentBody, ConfirmPaymentRequest, CreatePaymentIntentRequest, Envelope,
    PaymentBody, PaymentIntentBody, WebhookAck,
};
use fete_types::models::PaymentStatus;

use crate::bookings::load_visible;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::state::{AppState, with_db};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Start a charge for one of the caller's bookings. The amount always comes
/// from the stored booking.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreatePaymentIntentRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking_id = req.booking_id;
    let owner = claims.sub;
    let booking = with_db(&state, move |s| {
        let booking = s.db.get_booking(booking_id)?.ok_or_else(|| ApiError::not_found("Booking"))?;
        if booking.client.id != owner {
            return Err(ApiError::access_denied());
        }
        Ok(booking)
    })
    .await?;

    if booking.payment.status == PaymentStatus::Paid {
        return Err(ApiError::validation("Booking is already paid"));
    }

    let amount = booking.payment.minor_units();
    let metadata = HashMap::from([
        ("bookingId".to_string(), booking.id.to_string()),
        ("userId".to_string(), owner.to_string()),
    ]);
    let intent = state.payments.create_intent(amount, &booking.payment.currency, metadata).await?;

    let intent_id = intent.id.clone();
    with_db(&state, move |s| {
        if s.db.set_payment_intent(booking_id, &intent_id)? {
            return Ok(());
        }
        match s.db.get_booking(booking_id)? {
            Some(_) => Err(ApiError::validation("Booking is already paid")),
            None => Err(ApiError::not_found("Booking")),
        }
    })
    .await?;

    info!("Created payment intent {} for booking {} ({} minor units)", intent.id, booking.id, amount);
    Ok(Json(Envelope::ok(PaymentIntentBody {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
        amount,
        currency: booking.payment.currency,
    })))
}

/// Synchronous confirmation after the client-side payment step. Safe to
/// repeat: a second call returns the already-paid booking unchanged.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ConfirmPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = state.payments.intent_status(&req.payment_intent_id).await?;
    if status != IntentStatus::Succeeded {
        info!("Payment intent {} not successful: {:?}", req.payment_intent_id, status);
        return Err(ApiError::PaymentNotSuccessful);
    }

    let intent_id = req.payment_intent_id;
    let caller = claims.sub;
    let booking = with_db(&state, move |s| {
        let id = match s.db.mark_paid(&intent_id, Some(caller))? {
            PaidTransition::Applied(id) => {
                info!("Booking {} paid via confirmation of {}", id, intent_id);
                id
            }
            PaidTransition::AlreadyPaid(id) => id,
            PaidTransition::NotFound => return Err(ApiError::not_found("Booking")),
        };
        s.db.get_booking(id)?.ok_or_else(|| ApiError::not_found("Booking"))
    })
    .await?;

    Ok(Json(Envelope::ok(ConfirmPaymentBody {
        booking,
        message: "Payment confirmed successfully".into(),
    })))
}

/// Processor callback. Nothing changes unless the signature verifies.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::validation("Webhook Error: webhook secret is not configured"))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation("Webhook Error: missing signature"))?;

    let event = webhook::construct_event(&body, signature, secret).map_err(|e| {
        warn!("Rejected webhook: {}", e);
        ApiError::validation(format!("Webhook Error: {e}"))
    })?;

    match event {
        WebhookEvent::PaymentSucceeded { intent_id } => {
            let transition = with_db(&state, move |s| Ok(s.db.mark_paid(&intent_id, None)?)).await?;
            match transition {
                PaidTransition::Applied(id) => info!("Booking {} paid via webhook", id),
                PaidTransition::AlreadyPaid(id) => info!("Booking {} already paid", id),
                PaidTransition::NotFound => warn!("Succeeded intent matches no booking"),
            }
        }
        WebhookEvent::PaymentFailed { intent_id } => {
            let booking = with_db(&state, move |s| Ok(s.db.mark_failed(&intent_id)?)).await?;
            match booking {
                Some(id) => info!("Booking {} payment failed", id),
                None => warn!("Failed intent matches no unpaid booking"),
            }
        }
        WebhookEvent::Other(kind) => info!("Unhandled webhook event type {}", kind),
    }

    Ok(Json(WebhookAck { received: true }))
}

pub async fn booking_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let booking = with_db(&state, move |s| load_visible(s, &claims, id)).await?;
    Ok(Json(Envelope::ok(PaymentBody { payment: booking.payment })))
}
