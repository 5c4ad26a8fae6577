use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Attachment, Booking, BookingStatus, EventCategory, EventDetails, FollowUp,
    Image, Message, MessageType, Payment, PortfolioDetails, PortfolioEvent, Preferences, Role,
    ServiceItem, ServiceType, Testimonial, User,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the chat WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

// -- Envelope --

/// Every successful response is `{ "success": true, ...body }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn ok(body: T) -> Self {
        Self { success: true, body }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub pages: u32,
    pub total: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(u64::from(limit)) as u32 };
        Self { page, pages, total }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: Role,
}

// -- Portfolio events --

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Full-record body for creating or replacing a portfolio event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventInput {
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub details: PortfolioDetails,
    #[serde(default)]
    pub services: Vec<ServiceItem>,
    pub testimonial: Option<Testimonial>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct EventListBody {
    pub events: Vec<PortfolioEvent>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct EventBody {
    pub event: PortfolioEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStat {
    pub category: EventCategory,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct CategoryStatsBody {
    pub stats: Vec<CategoryStat>,
}

// -- Bookings --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientNoteInput {
    pub client: Option<String>,
}

/// Unknown fields (including any payment amount) are ignored; the amount is
/// always taken from the service price table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_type: ServiceType,
    pub event_category: EventCategory,
    #[serde(default)]
    pub event_details: EventDetails,
    pub consultation_date: DateTime<Utc>,
    pub duration: Option<u32>,
    #[serde(default)]
    pub notes: ClientNoteInput,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Fields a client may change on its own booking.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientUpdate {
    pub event_details: Option<EventDetails>,
    pub notes: Option<ClientNoteUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientNoteUpdate {
    pub client: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaffNoteUpdate {
    pub client: Option<String>,
    pub planner: Option<String>,
    pub admin: Option<String>,
}

/// Fields staff (planner/admin) may change on any booking they can see.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdminUpdate {
    pub status: Option<BookingStatus>,
    pub assigned_planner: Option<Uuid>,
    pub event_details: Option<EventDetails>,
    pub notes: Option<StaffNoteUpdate>,
    pub consultation_date: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
    pub follow_up: Option<FollowUp>,
}

/// Role-scoped update schema for `PUT /api/bookings/{id}`.
#[derive(Debug, Clone)]
pub enum BookingUpdate {
    Client(ClientUpdate),
    Staff(AdminUpdate),
}

impl BookingUpdate {
    /// Interpret a raw body under the schema the caller's role allows.
    pub fn from_value(role: Role, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if role.is_staff() {
            serde_json::from_value(value).map(Self::Staff)
        } else {
            serde_json::from_value(value).map(Self::Client)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssignPlannerRequest {
    pub planner_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdateRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct BookingBody {
    pub booking: Booking,
}

#[derive(Debug, Serialize)]
pub struct BookingListBody {
    pub bookings: Vec<Booking>,
    pub pagination: Pagination,
}

// -- Payments --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentBody {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmPaymentBody {
    pub booking: Booking,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentBody {
    pub payment: Payment,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessageListBody {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct MessageDataBody {
    pub data: Message,
}

#[derive(Debug, Serialize)]
pub struct ReadReceiptBody {
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChat {
    pub chat_id: String,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub message_count: u64,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct ActiveChatsBody {
    pub chats: Vec<ActiveChat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssistantRequest {
    pub content: String,
    #[serde(default)]
    pub live_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantBody {
    pub reply: Option<Message>,
    pub live_mode: bool,
    pub typing_delay_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct WelcomeBody {
    pub content: String,
}

// -- Health --

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_body() {
        let value = serde_json::to_value(Envelope::ok(MessageBody { message: "hi".into() })).unwrap();
        assert_eq!(value, serde_json::json!({ "success": true, "message": "hi" }));
    }

    #[test]
    fn pagination_rounds_pages_up() {
        assert_eq!(Pagination::new(1, 10, 0).pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).pages, 1);
        assert_eq!(Pagination::new(2, 10, 11).pages, 2);
    }

    #[test]
    fn client_schema_rejects_status_changes() {
        let body = serde_json::json!({ "status": "confirmed" });
        assert!(BookingUpdate::from_value(Role::Client, body.clone()).is_err());
        match BookingUpdate::from_value(Role::Admin, body).unwrap() {
            BookingUpdate::Staff(update) => assert_eq!(update.status, Some(BookingStatus::Confirmed)),
            BookingUpdate::Client(_) => panic!("admin body parsed under client schema"),
        }
    }

    #[test]
    fn client_schema_accepts_details_and_note() {
        let body = serde_json::json!({
            "eventDetails": { "title": "Garden party", "guestCount": 40 },
            "notes": { "client": "Vegetarian menu please" }
        });
        match BookingUpdate::from_value(Role::Client, body).unwrap() {
            BookingUpdate::Client(update) => {
                assert_eq!(update.event_details.unwrap().guest_count, Some(40));
                assert_eq!(update.notes.unwrap().client.as_deref(), Some("Vegetarian menu please"));
            }
            BookingUpdate::Staff(_) => panic!("client body parsed under staff schema"),
        }
    }

    #[test]
    fn create_booking_ignores_client_amount() {
        let body = serde_json::json!({
            "serviceType": "consultation",
            "eventCategory": "formal",
            "consultationDate": "2026-11-02T15:00:00Z",
            "payment": { "amount": 1 }
        });
        let req: CreateBookingRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.service_type.price(), 150);
    }
}
