//! Stripe webhook verification.
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! Each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"` keyed by the endpoint
//! secret; one match is enough.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age (and future skew) of a signed timestamp, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing or malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("no signature matched")]
    Mismatch,

    #[error("webhook secret is not configured")]
    NoSecret,

    #[error("invalid webhook payload: {0}")]
    Payload(String),
}

/// Events the booking flow reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded { intent_id: String },
    PaymentFailed { intent_id: String },
    /// Acknowledged and ignored.
    Other(String),
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    id: Option<String>,
}

/// Verify the signature against the current clock, then parse the event.
pub fn construct_event(payload: &[u8], header: &str, secret: &str) -> Result<WebhookEvent, SignatureError> {
    verify_signature(payload, header, secret, Utc::now().timestamp())?;
    WebhookEvent::parse(payload)
}

pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::NoSecret);
    }

    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    let issued: i64 = timestamp.parse().map_err(|_| SignatureError::MalformedHeader)?;
    if (now - issued).abs() > TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::NoSecret)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice compares in constant time
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, SignatureError> {
        let raw: RawEvent =
            serde_json::from_slice(payload).map_err(|e| SignatureError::Payload(e.to_string()))?;

        let intent_id = || {
            raw.data
                .object
                .id
                .clone()
                .ok_or_else(|| SignatureError::Payload("event object has no id".into()))
        };

        Ok(match raw.kind.as_str() {
            "payment_intent.succeeded" => Self::PaymentSucceeded { intent_id: intent_id()? },
            "payment_intent.payment_failed" => Self::PaymentFailed { intent_id: intent_id()? },
            other => Self::Other(other.to_string()),
        })
    }
}

/// Build a valid header for `payload`. Used by tests across the workspace.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_42"}}}"#;

    #[test]
    fn valid_signature_is_accepted() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(verify_signature(BODY, &header, SECRET, 1_700_000_100), Ok(()));
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let good = sign(BODY, SECRET, 1_700_000_000);
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t=1700000000,v1=deadbeef,v1={v1}");
        assert_eq!(verify_signature(BODY, &header, SECRET, 1_700_000_000), Ok(()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        let tampered = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_43"}}}"#;
        assert_eq!(
            verify_signature(tampered, &header, SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign(BODY, SECRET, 1_700_000_000);
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 1_700_000_000 + TOLERANCE_SECS + 1),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn header_without_signature_is_malformed() {
        assert_eq!(
            verify_signature(BODY, "t=1700000000", SECRET, 1_700_000_000),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(verify_signature(BODY, "", SECRET, 0), Err(SignatureError::MalformedHeader));
    }

    #[test]
    fn parses_payment_events() {
        assert_eq!(
            WebhookEvent::parse(BODY).unwrap(),
            WebhookEvent::PaymentSucceeded { intent_id: "pi_42".into() }
        );

        let failed = br#"{"type":"payment_intent.payment_failed","data":{"object":{"id":"pi_7"}}}"#;
        assert_eq!(
            WebhookEvent::parse(failed).unwrap(),
            WebhookEvent::PaymentFailed { intent_id: "pi_7".into() }
        );

        let other = br#"{"type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert_eq!(WebhookEvent::parse(other).unwrap(), WebhookEvent::Other("charge.refunded".into()));
    }
}
