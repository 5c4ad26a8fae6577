use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use fete_db::{BookingChanges, BookingScope, NewBooking};
use fete_types::api::{
    AssignPlannerRequest, BookingBody, BookingListBody, BookingQuery, BookingUpdate, Claims,
    CreateBookingRequest, Envelope, Pagination, StatusUpdateRequest,
};
use fete_types::models::{Booking, BookingStatus, DEFAULT_CURRENCY, PaymentStatus, Role};

use crate::error::{ApiError, ApiResult};
use crate::events::paging;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::{AppState, AppStateInner, with_db};

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;
const DEFAULT_DURATION_MINUTES: u32 = 60;
const MAX_DURATION_MINUTES: u32 = 8 * 60;

/// Which bookings `claims` may list.
pub fn scope_for(claims: &Claims) -> BookingScope {
    match claims.role {
        Role::Admin => BookingScope::All,
        Role::Planner => BookingScope::Planner(claims.sub),
        Role::Client => BookingScope::Client(claims.sub),
    }
}

/// Clients see their own bookings, planners the ones assigned to them.
pub fn can_view(claims: &Claims, booking: &Booking) -> bool {
    match claims.role {
        Role::Admin => true,
        Role::Planner => booking.assigned_planner.as_ref().is_some_and(|p| p.id == claims.sub),
        Role::Client => booking.client.id == claims.sub,
    }
}

/// Load a booking the caller is allowed to see: 404 when missing, 403 when
/// it belongs to someone else.
pub(crate) fn load_visible(s: &AppStateInner, claims: &Claims, id: Uuid) -> ApiResult<Booking> {
    let booking = s.db.get_booking(id)?.ok_or_else(|| ApiError::not_found("Booking"))?;
    if !can_view(claims, &booking) {
        return Err(ApiError::access_denied());
    }
    Ok(booking)
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<BookingQuery>,
) -> ApiResult<impl IntoResponse> {
    let scope = scope_for(&claims);
    let (page, limit, offset) = paging(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);
    let status = query.status;

    let (bookings, total) =
        with_db(&state, move |s| Ok(s.db.list_bookings(scope, status, offset, limit)?)).await?;

    Ok(Json(Envelope::ok(BookingListBody { bookings, pagination: Pagination::new(page, limit, total) })))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let booking = with_db(&state, move |s| load_visible(s, &claims, id)).await?;
    Ok(Json(Envelope::ok(BookingBody { booking })))
}

pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.consultation_date <= Utc::now() {
        return Err(ApiError::validation("Consultation date must be in the future"));
    }
    let duration = req.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
    check_duration(duration)?;

    let new = NewBooking {
        id: Uuid::new_v4(),
        client_id: claims.sub,
        service_type: req.service_type,
        event_category: req.event_category,
        event_details: req.event_details,
        consultation_date: req.consultation_date,
        duration,
        amount: req.service_type.price(),
        currency: DEFAULT_CURRENCY.to_string(),
        client_note: non_empty(req.notes.client),
    };

    let booking = with_db(&state, move |s| Ok(s.db.insert_booking(&new)?)).await?;

    info!(
        "{} booked {} for {} ({})",
        claims.email,
        booking.service_type.display_name(),
        booking.consultation_date,
        booking.id
    );
    Ok((StatusCode::CREATED, Json(Envelope::ok(BookingBody { booking }))))
}

/// The accepted body schema depends on the caller's role; see `BookingUpdate`.
pub async fn update_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<impl IntoResponse> {
    let update = BookingUpdate::from_value(claims.role, body).map_err(|e| ApiError::validation(e.to_string()))?;
    let changes = into_changes(update)?;

    let booking = with_db(&state, move |s| {
        load_visible(s, &claims, id)?;
        if let Some(planner) = changes.assigned_planner {
            ensure_planner(s, planner)?;
        }
        if changes.status == Some(BookingStatus::Completed) {
            warn_if_unpaid(s, id)?;
        }
        s.db.update_booking(id, &changes)?.ok_or_else(|| ApiError::not_found("Booking"))
    })
    .await?;

    Ok(Json(Envelope::ok(BookingBody { booking })))
}

pub async fn assign_planner(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignPlannerRequest>,
) -> ApiResult<impl IntoResponse> {
    let planner = req.planner_id;
    let booking = with_db(&state, move |s| {
        ensure_planner(s, planner)?;
        let changes = BookingChanges { assigned_planner: Some(planner), ..Default::default() };
        s.db.update_booking(id, &changes)?.ok_or_else(|| ApiError::not_found("Booking"))
    })
    .await?;

    info!("{} assigned planner {} to booking {}", claims.email, planner, booking.id);
    Ok(Json(Envelope::ok(BookingBody { booking })))
}

/// Direct overwrite by staff. Payment state is not consulted beyond a warning
/// when an unpaid booking is marked completed.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let status = req.status;
    check_staff_status(status)?;
    let booking = with_db(&state, move |s| {
        if status == BookingStatus::Completed {
            warn_if_unpaid(s, id)?;
        }
        let changes = BookingChanges { status: Some(status), ..Default::default() };
        s.db.update_booking(id, &changes)?.ok_or_else(|| ApiError::not_found("Booking"))
    })
    .await?;

    info!("{} set booking {} to {}", claims.email, booking.id, booking.status);
    Ok(Json(Envelope::ok(BookingBody { booking })))
}

fn into_changes(update: BookingUpdate) -> ApiResult<BookingChanges> {
    let changes = match update {
        BookingUpdate::Client(update) => BookingChanges {
            event_details: update.event_details,
            note_client: update.notes.and_then(|n| n.client),
            ..Default::default()
        },
        BookingUpdate::Staff(update) => {
            if let Some(duration) = update.duration {
                check_duration(duration)?;
            }
            if let Some(status) = update.status {
                check_staff_status(status)?;
            }
            let notes = update.notes.unwrap_or_default();
            BookingChanges {
                status: update.status,
                assigned_planner: update.assigned_planner,
                event_details: update.event_details,
                consultation_date: update.consultation_date,
                duration: update.duration,
                follow_up: update.follow_up,
                note_client: notes.client,
                note_planner: notes.planner,
                note_admin: notes.admin,
            }
        }
    };
    if changes.is_empty() {
        return Err(ApiError::validation("No updatable fields supplied"));
    }
    Ok(changes)
}

fn ensure_planner(s: &AppStateInner, user_id: Uuid) -> ApiResult<()> {
    let row = s.db.get_user_by_id(user_id)?.ok_or_else(|| ApiError::not_found("Planner"))?;
    if !row.user.role.is_staff() {
        return Err(ApiError::validation("Assigned user must be a planner or admin"));
    }
    Ok(())
}

fn warn_if_unpaid(s: &AppStateInner, id: Uuid) -> ApiResult<()> {
    if let Some(booking) = s.db.get_booking(id)? {
        if booking.payment.status != PaymentStatus::Paid {
            warn!("Booking {} marked completed with payment {}", id, booking.payment.status);
        }
    }
    Ok(())
}

/// Only creation produces `pending`; staff move bookings forward or cancel them.
fn check_staff_status(status: BookingStatus) -> ApiResult<()> {
    if status == BookingStatus::Pending {
        return Err(ApiError::validation("Status must be confirmed, completed or cancelled"));
    }
    Ok(())
}

fn check_duration(minutes: u32) -> ApiResult<()> {
    if minutes == 0 || minutes > MAX_DURATION_MINUTES {
        return Err(ApiError::validation("Duration must be between 1 and 480 minutes"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fete_types::api::{AdminUpdate, ClientNoteUpdate, ClientUpdate};
    use fete_types::models::{BookingNotes, EventCategory, EventDetails, FollowUp, Payment, ServiceType, UserRef};

    fn claims(role: Role) -> Claims {
        Claims { sub: Uuid::new_v4(), name: "Sam".into(), email: "sam@example.com".into(), role, exp: 0 }
    }

    fn booking(client: Uuid, planner: Option<Uuid>) -> Booking {
        let user_ref = |id| UserRef { id, name: "x".into(), email: "x@example.com".into(), phone: None };
        Booking {
            id: Uuid::new_v4(),
            client: user_ref(client),
            service_type: ServiceType::Consultation,
            event_category: EventCategory::Casual,
            event_details: EventDetails::default(),
            consultation_date: Utc::now(),
            duration: 60,
            status: BookingStatus::Pending,
            payment: Payment {
                amount: 150,
                currency: DEFAULT_CURRENCY.into(),
                payment_intent_id: None,
                status: PaymentStatus::Pending,
                paid_at: None,
            },
            assigned_planner: planner.map(user_ref),
            notes: BookingNotes::default(),
            follow_up: FollowUp::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn visibility_follows_role() {
        let client = claims(Role::Client);
        let planner = claims(Role::Planner);
        let admin = claims(Role::Admin);

        let own = booking(client.sub, Some(planner.sub));
        let other = booking(Uuid::new_v4(), None);

        assert!(can_view(&client, &own));
        assert!(!can_view(&client, &other));
        assert!(can_view(&planner, &own));
        assert!(!can_view(&planner, &other));
        assert!(can_view(&admin, &other));
    }

    #[test]
    fn list_scope_follows_role() {
        let client = claims(Role::Client);
        assert_eq!(scope_for(&client), BookingScope::Client(client.sub));
        assert_eq!(scope_for(&claims(Role::Admin)), BookingScope::All);
    }

    #[test]
    fn client_update_touches_only_client_columns() {
        let changes = into_changes(BookingUpdate::Client(ClientUpdate {
            event_details: None,
            notes: Some(ClientNoteUpdate { client: Some("Bring swatches".into()) }),
        }))
        .unwrap();
        assert_eq!(changes.note_client.as_deref(), Some("Bring swatches"));
        assert!(changes.status.is_none() && changes.note_admin.is_none());
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(into_changes(BookingUpdate::Staff(AdminUpdate::default())).is_err());
        let too_long = AdminUpdate { duration: Some(600), ..Default::default() };
        assert!(into_changes(BookingUpdate::Staff(too_long)).is_err());
    }

    #[test]
    fn staff_cannot_reset_to_pending() {
        let reset = AdminUpdate { status: Some(BookingStatus::Pending), ..Default::default() };
        assert!(into_changes(BookingUpdate::Staff(reset)).is_err());

        let cancel = AdminUpdate { status: Some(BookingStatus::Cancelled), ..Default::default() };
        assert_eq!(into_changes(BookingUpdate::Staff(cancel)).unwrap().status, Some(BookingStatus::Cancelled));
        assert!(check_staff_status(BookingStatus::Pending).is_err());
        assert!(check_staff_status(BookingStatus::Completed).is_ok());
    }
}
