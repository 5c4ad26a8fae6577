use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted string is not a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// serde names match the database representation.
macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Planner,
    Admin,
}

string_enum!(Role, "role", {
    Client => "client",
    Planner => "planner",
    Admin => "admin",
});

impl Role {
    /// Planners and admins share the staff surface of the API.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Planner | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub email: bool,
    pub sms: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self { email: true, sms: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub event_types: Vec<EventCategory>,
    #[serde(default)]
    pub budget: BudgetRange,
    #[serde(default)]
    pub notifications: NotificationPrefs,
}

/// Public view of a user. The password hash never leaves `fete-db`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub avatar: String,
    pub is_verified: bool,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Portfolio events --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Formal,
    Casual,
    Diy,
}

string_enum!(EventCategory, "event category", {
    Formal => "formal",
    Casual => "casual",
    Diy => "diy",
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioDetails {
    pub location: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub guest_count: Option<u32>,
    #[serde(default)]
    pub budget: BudgetRange,
    pub duration: Option<String>,
    #[serde(default)]
    pub special_requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub included: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub client_name: String,
    pub rating: u8,
    #[serde(default)]
    pub review: String,
    pub date: Option<DateTime<Utc>>,
}

/// A published past engagement shown in the gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioEvent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub images: Vec<Image>,
    pub details: PortfolioDetails,
    pub services: Vec<ServiceItem>,
    pub testimonial: Option<Testimonial>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_by: Uuid,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Bookings --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Consultation,
    FullPlanning,
    PartialPlanning,
    DiyAssistance,
}

string_enum!(ServiceType, "service type", {
    Consultation => "consultation",
    FullPlanning => "full-planning",
    PartialPlanning => "partial-planning",
    DiyAssistance => "diy-assistance",
});

pub const DEFAULT_CURRENCY: &str = "USD";

impl ServiceType {
    /// List price in whole currency units. This is the only source of a
    /// booking's payment amount.
    pub fn price(&self) -> u32 {
        match self {
            Self::Consultation => 150,
            Self::FullPlanning => 300,
            Self::PartialPlanning => 200,
            Self::DiyAssistance => 100,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Consultation => "Initial Consultation",
            Self::FullPlanning => "Full Event Planning",
            Self::PartialPlanning => "Partial Planning",
            Self::DiyAssistance => "DIY Guidance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

string_enum!(BookingStatus, "booking status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub guest_count: Option<u32>,
    #[serde(default)]
    pub budget: BudgetRange,
    pub description: Option<String>,
    #[serde(default)]
    pub special_requirements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: u32,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Amount in the processor's minor-unit convention (cents for USD).
    pub fn minor_units(&self) -> i64 {
        i64::from(self.amount) * 100
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingNotes {
    pub client: Option<String>,
    pub planner: Option<String>,
    pub admin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub required: bool,
    pub date: Option<DateTime<Utc>>,
    pub completed: bool,
}

impl Default for FollowUp {
    fn default() -> Self {
        Self { required: true, date: None, completed: false }
    }
}

/// Minimal user reference embedded in bookings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub client: UserRef,
    pub service_type: ServiceType,
    pub event_category: EventCategory,
    pub event_details: EventDetails,
    pub consultation_date: DateTime<Utc>,
    pub duration: u32,
    pub status: BookingStatus,
    pub payment: Payment,
    pub assigned_planner: Option<UserRef>,
    pub notes: BookingNotes,
    pub follow_up: FollowUp,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Chat --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Admin,
    Guest,
    Bot,
    System,
}

string_enum!(SenderType, "sender type", {
    User => "user",
    Admin => "admin",
    Guest => "guest",
    Bot => "bot",
    System => "system",
});

impl SenderType {
    /// Classification of a human sender. `Bot` and `System` are never
    /// derived from a caller; only the server assigns them.
    pub fn for_sender(role: Option<Role>) -> Self {
        match role {
            Some(role) if role.is_staff() => Self::Admin,
            Some(_) => Self::User,
            None => Self::Guest,
        }
    }
}

/// Longest accepted chat id.
pub const MAX_CHAT_ID_LEN: usize = 128;

/// Chat ids are opaque client-generated strings such as `chat_1700000000_k3j2`.
pub fn is_valid_chat_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CHAT_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

string_enum!(MessageType, "message type", {
    Text => "text",
    Image => "image",
    File => "file",
    System => "system",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: String,
    pub sender: Option<Uuid>,
    pub sender_type: SenderType,
    pub sender_name: String,
    pub sender_email: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_table_matches_catalog() {
        assert_eq!(ServiceType::Consultation.price(), 150);
        assert_eq!(ServiceType::FullPlanning.price(), 300);
        assert_eq!(ServiceType::PartialPlanning.price(), 200);
        assert_eq!(ServiceType::DiyAssistance.price(), 100);
    }

    #[test]
    fn consultation_amount_in_cents() {
        let payment = Payment {
            amount: ServiceType::Consultation.price(),
            currency: DEFAULT_CURRENCY.into(),
            payment_intent_id: None,
            status: PaymentStatus::Pending,
            paid_at: None,
        };
        assert_eq!(payment.minor_units(), 15_000);
    }

    #[test]
    fn sender_type_is_derived_from_role() {
        assert_eq!(SenderType::for_sender(Some(Role::Admin)), SenderType::Admin);
        assert_eq!(SenderType::for_sender(Some(Role::Planner)), SenderType::Admin);
        assert_eq!(SenderType::for_sender(Some(Role::Client)), SenderType::User);
        assert_eq!(SenderType::for_sender(None), SenderType::Guest);
    }

    #[test]
    fn service_type_uses_kebab_case_on_the_wire() {
        let json = serde_json::to_string(&ServiceType::DiyAssistance).unwrap();
        assert_eq!(json, "\"diy-assistance\"");
        assert_eq!("full-planning".parse::<ServiceType>().unwrap(), ServiceType::FullPlanning);
    }

    #[test]
    fn chat_ids_are_restricted() {
        assert!(is_valid_chat_id("chat_1700000000_k3j2-x"));
        assert!(!is_valid_chat_id(""));
        assert!(!is_valid_chat_id("chat 1"));
        assert!(!is_valid_chat_id("../etc"));
        assert!(!is_valid_chat_id(&"a".repeat(MAX_CHAT_ID_LEN + 1)));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "archived".parse::<BookingStatus>().unwrap_err();
        assert_eq!(err.kind, "booking status");
    }
}
