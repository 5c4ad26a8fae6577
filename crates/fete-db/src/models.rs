//! Write-side inputs and row types. Read paths map straight into
//! `fete_types::models`; only the user row carries the password hash, which
//! never leaves this crate's callers in serialized form.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use fete_types::models::{
    Attachment, BookingStatus, EventCategory, EventDetails, FollowUp, MessageType, Role,
    SenderType, ServiceType, User,
};

pub struct UserRow {
    pub user: User,
    pub password_hash: String,
}

pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub category: Option<EventCategory>,
    pub featured_only: bool,
    pub search: Option<String>,
}

pub struct NewBooking {
    pub id: Uuid,
    pub client_id: Uuid,
    pub service_type: ServiceType,
    pub event_category: EventCategory,
    pub event_details: EventDetails,
    pub consultation_date: DateTime<Utc>,
    pub duration: u32,
    pub amount: u32,
    pub currency: String,
    pub client_note: Option<String>,
}

/// Which bookings a caller may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingScope {
    All,
    Client(Uuid),
    Planner(Uuid),
}

/// Column-level booking changes; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct BookingChanges {
    pub status: Option<BookingStatus>,
    pub assigned_planner: Option<Uuid>,
    pub event_details: Option<EventDetails>,
    pub consultation_date: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
    pub follow_up: Option<FollowUp>,
    pub note_client: Option<String>,
    pub note_planner: Option<String>,
    pub note_admin: Option<String>,
}

impl BookingChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_planner.is_none()
            && self.event_details.is_none()
            && self.consultation_date.is_none()
            && self.duration.is_none()
            && self.follow_up.is_none()
            && self.note_client.is_none()
            && self.note_planner.is_none()
            && self.note_admin.is_none()
    }
}

/// Outcome of the conditional paid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidTransition {
    /// This call moved the booking to paid/confirmed.
    Applied(Uuid),
    /// The booking was already paid; nothing changed.
    AlreadyPaid(Uuid),
    NotFound,
}

impl PaidTransition {
    pub fn booking_id(&self) -> Option<Uuid> {
        match self {
            Self::Applied(id) | Self::AlreadyPaid(id) => Some(*id),
            Self::NotFound => None,
        }
    }
}

pub struct NewMessage {
    pub id: Uuid,
    pub chat_id: String,
    pub sender: Option<Uuid>,
    pub sender_type: SenderType,
    pub sender_name: String,
    pub sender_email: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
}
