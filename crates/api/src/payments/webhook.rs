//! Inbound provider events: signature verification and a closed set of
//! typed payloads.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use super::CheckoutSession;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingHeader,
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
    #[error("webhook secret cannot key the MAC")]
    InvalidSecret,
}

fn parse_header(header: &str) -> Result<(i64, Vec<Vec<u8>>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
        match key {
            "t" => timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?),
            "v1" => {
                // Unknown encodings are skipped; another v1 entry may still match.
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(SignatureError::Malformed),
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Checks `t=<unix>,v1=<hex>` against an HMAC-SHA256 of `"{t}.{payload}"`.
/// Comparison is constant-time.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::MissingHeader)?;
    let (timestamp, signatures) = parse_header(header)?;

    let age = (now.timestamp() - timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(SignatureError::Expired);
    }

    for sig in &signatures {
        if mac_for(secret, timestamp, payload)?.verify_slice(sig).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Builds a header value the way the provider does. Used by tests and local
/// tooling that replays payloads.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let signature = mac_for(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub period_end: Option<i64>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
}

/// Every provider event the engine reacts to. Anything else lands in
/// `Unhandled` and is acknowledged without side effects.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutSession),
    CheckoutAsyncPaymentSucceeded(CheckoutSession),
    CheckoutAsyncPaymentFailed(CheckoutSession),
    CheckoutExpired(CheckoutSession),
    SubscriptionUpdated(Subscription),
    SubscriptionDeleted(Subscription),
    InvoicePaid(Invoice),
    InvoicePaymentFailed(Invoice),
    Unhandled(String),
}

#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub id: String,
    pub event_type: String,
    pub created: DateTime<Utc>,
    pub event: WebhookEvent,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not a provider event: {0}")]
    Envelope(serde_json::Error),
    #[error("`{event_type}` object is malformed: {source}")]
    Object {
        event_type: String,
        source: serde_json::Error,
    },
    #[error("event timestamp {0} is out of range")]
    Timestamp(i64),
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: Value,
}

fn object<T: serde::de::DeserializeOwned>(event_type: &str, value: Value) -> Result<T, PayloadError> {
    serde_json::from_value(value).map_err(|source| PayloadError::Object {
        event_type: event_type.to_string(),
        source,
    })
}

pub fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

impl ProviderEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let raw: Value = serde_json::from_slice(payload).map_err(PayloadError::Envelope)?;
        let envelope: Envelope = serde_json::from_value(raw.clone()).map_err(PayloadError::Envelope)?;
        let created = unix_to_utc(envelope.created).ok_or(PayloadError::Timestamp(envelope.created))?;

        let t = envelope.event_type.as_str();
        let obj = envelope.data.object;
        let event = match t {
            "checkout.session.completed" => WebhookEvent::CheckoutCompleted(object(t, obj)?),
            "checkout.session.async_payment_succeeded" => {
                WebhookEvent::CheckoutAsyncPaymentSucceeded(object(t, obj)?)
            }
            "checkout.session.async_payment_failed" => {
                WebhookEvent::CheckoutAsyncPaymentFailed(object(t, obj)?)
            }
            "checkout.session.expired" => WebhookEvent::CheckoutExpired(object(t, obj)?),
            "customer.subscription.updated" => WebhookEvent::SubscriptionUpdated(object(t, obj)?),
            "customer.subscription.deleted" => WebhookEvent::SubscriptionDeleted(object(t, obj)?),
            "invoice.paid" => WebhookEvent::InvoicePaid(object(t, obj)?),
            "invoice.payment_failed" => WebhookEvent::InvoicePaymentFailed(object(t, obj)?),
            other => WebhookEvent::Unhandled(other.to_string()),
        };

        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            created,
            event,
            raw,
        })
    }
}
