//! Payment provider contract.
//!
//! The engine only ever talks to the provider through `PaymentProvider`, so
//! the Stripe client can be swapped for a fake in tests.

pub mod metadata;
pub mod stripe;
pub mod webhook;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use metadata::{CheckoutMetadata, MetadataError};
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("provider response missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPrice {
    pub product_id: String,
    pub unit_amount: i64,
    pub currency: String,
    /// `Some("month")` for recurring prices.
    pub recurring_interval: Option<&'static str>,
}

/// Settlement split for a connected sub-account.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformFee {
    /// One-off payments carry an absolute fee in minor units.
    Amount(i64),
    /// Subscriptions carry a percentage applied to every invoice.
    Percent(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeSplit {
    pub destination_account: String,
    pub fee: PlatformFee,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub mode: CheckoutMode,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: CheckoutMetadata,
    pub split: Option<FeeSplit>,
}

/// A checkout session as reported by the provider, both from the API and
/// inside webhook payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Money has moved (or nothing was owed).
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the provider product id.
    async fn create_product(&self, name: &str) -> Result<String, ProviderError>;

    /// Returns the provider price id.
    async fn create_price(&self, price: &NewPrice) -> Result<String, ProviderError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, ProviderError>;

    async fn cancel_subscription(&self, id: &str) -> Result<(), ProviderError>;
}
