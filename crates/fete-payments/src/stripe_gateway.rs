use std::collections::HashMap;

use futures_util::future::BoxFuture;
use stripe::{Client, CreatePaymentIntent, Currency, PaymentIntent, PaymentIntentId, PaymentIntentStatus};
use tracing::{error, info};

use crate::{CreatedIntent, IntentStatus, PaymentError, PaymentGateway, Result};

/// Stripe-backed gateway. Without a secret key every call fails with
/// `NotConfigured`, so the rest of the API keeps working in development.
pub struct StripeGateway {
    client: Option<Client>,
}

impl StripeGateway {
    pub fn new(secret_key: Option<String>) -> Self {
        Self { client: secret_key.map(Client::new) }
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or(PaymentError::NotConfigured)
    }
}

fn currency(code: &str) -> Result<Currency> {
    match code.to_ascii_lowercase().as_str() {
        "usd" => Ok(Currency::USD),
        other => Err(PaymentError::UnsupportedCurrency(other.to_string())),
    }
}

impl PaymentGateway for StripeGateway {
    fn create_intent<'a>(
        &'a self,
        amount_minor: i64,
        currency_code: &'a str,
        metadata: HashMap<String, String>,
    ) -> BoxFuture<'a, Result<CreatedIntent>> {
        Box::pin(async move {
            let client = self.client()?;
            let mut params = CreatePaymentIntent::new(amount_minor, currency(currency_code)?);
            params.metadata = Some(metadata);

            let intent = PaymentIntent::create(client, params).await.map_err(|e| {
                error!("Stripe create payment intent failed: {:?}", e);
                PaymentError::Processor(e.to_string())
            })?;

            let id = intent.id.to_string();
            let client_secret = intent
                .client_secret
                .ok_or_else(|| PaymentError::MissingClientSecret(id.clone()))?;

            info!("Created payment intent {} for {} minor units", id, amount_minor);
            Ok(CreatedIntent { id, client_secret })
        })
    }

    fn intent_status<'a>(&'a self, intent_id: &'a str) -> BoxFuture<'a, Result<IntentStatus>> {
        Box::pin(async move {
            let client = self.client()?;
            let id: PaymentIntentId = intent_id
                .parse()
                .map_err(|_| PaymentError::InvalidIntentId(intent_id.to_string()))?;

            let intent = PaymentIntent::retrieve(client, &id, &[]).await.map_err(|e| {
                error!("Stripe retrieve payment intent {} failed: {:?}", intent_id, e);
                PaymentError::Processor(e.to_string())
            })?;

            Ok(match intent.status {
                PaymentIntentStatus::Succeeded => IntentStatus::Succeeded,
                PaymentIntentStatus::Processing => IntentStatus::Processing,
                PaymentIntentStatus::RequiresAction => IntentStatus::RequiresAction,
                PaymentIntentStatus::Canceled => IntentStatus::Canceled,
                _ => IntentStatus::Incomplete,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_usd_is_accepted() {
        assert!(matches!(currency("USD"), Ok(Currency::USD)));
        assert!(matches!(currency("eur"), Err(PaymentError::UnsupportedCurrency(c)) if c == "eur"));
    }

    #[tokio::test]
    async fn unconfigured_gateway_refuses_calls() {
        let gateway = StripeGateway::new(None);
        let err = gateway.intent_status("pi_123").await.unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured));
    }
}
