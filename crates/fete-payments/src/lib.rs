//! Payment processor seam. Handlers talk to a [`PaymentGateway`]; the server
//! wires in [`StripeGateway`], tests use [`mock::MockGateway`].

pub mod mock;
pub mod stripe_gateway;
pub mod webhook;

use std::collections::HashMap;

use futures_util::future::BoxFuture;

pub use stripe_gateway::StripeGateway;
pub use webhook::{SignatureError, WebhookEvent};

/// A freshly created payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

/// The processor-side lifecycle state we act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    Canceled,
    /// Anything else: awaiting a payment method, confirmation or capture.
    Incomplete,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment processor is not configured")]
    NotConfigured,

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("invalid payment intent id: {0}")]
    InvalidIntentId(String),

    #[error("processor returned no client secret for {0}")]
    MissingClientSecret(String),

    #[error("processor error: {0}")]
    Processor(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Operations the booking flow needs from a payment processor.
pub trait PaymentGateway: Send + Sync {
    /// Create an intent for `amount_minor` (cents for USD).
    fn create_intent<'a>(
        &'a self,
        amount_minor: i64,
        currency: &'a str,
        metadata: HashMap<String, String>,
    ) -> BoxFuture<'a, Result<CreatedIntent>>;

    fn intent_status<'a>(&'a self, intent_id: &'a str) -> BoxFuture<'a, Result<IntentStatus>>;
}
