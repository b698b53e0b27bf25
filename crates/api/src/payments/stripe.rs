use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};

use super::{
    CheckoutMode, CheckoutRequest, CheckoutSession, NewPrice, PaymentProvider, PlatformFee,
    ProviderError,
};
use crate::config::StripeConfig;

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Stripe REST client. Requests are form-encoded and authenticated with the
/// platform secret key.
#[derive(Clone)]
pub struct StripeClient {
    http: HttpClient,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, ProviderError> {
        let http = HttpClient::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let response = request.bearer_auth(&self.secret_key).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<ErrorEnvelope>().await {
                Ok(envelope) => {
                    let kind = envelope.error.kind.unwrap_or_else(|| "api_error".to_string());
                    let detail = envelope.error.message.unwrap_or_default();
                    format!("{kind}: {detail}")
                }
                Err(_) => "unreadable error body".to_string(),
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

/// Form fields for a checkout session.
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }

    // Subscription events only carry the subscription's own metadata, so the
    // correlation ids are copied onto it as well.
    let nested = match request.mode {
        CheckoutMode::Payment => "payment_intent_data",
        CheckoutMode::Subscription => "subscription_data",
    };
    for (key, value) in request.metadata.to_pairs() {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("{nested}[metadata][{key}]"), value));
    }

    if let Some(split) = &request.split {
        match (request.mode, &split.fee) {
            (CheckoutMode::Payment, PlatformFee::Amount(cents)) => {
                form.push(("payment_intent_data[application_fee_amount]".to_string(), cents.to_string()));
            }
            (CheckoutMode::Subscription, PlatformFee::Percent(pct)) => {
                form.push(("subscription_data[application_fee_percent]".to_string(), pct.to_string()));
            }
            (mode, fee) => {
                tracing::warn!(mode = mode.as_str(), ?fee, "fee type does not match checkout mode; omitted");
            }
        }
        form.push((
            format!("{nested}[transfer_data][destination]"),
            split.destination_account.clone(),
        ));
    }

    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_product(&self, name: &str) -> Result<String, ProviderError> {
        let created: Created = self
            .send(self.http.post(self.url("products")).form(&[("name", name)]))
            .await?;
        Ok(created.id)
    }

    async fn create_price(&self, price: &NewPrice) -> Result<String, ProviderError> {
        let mut form = vec![
            ("product", price.product_id.clone()),
            ("unit_amount", price.unit_amount.to_string()),
            ("currency", price.currency.clone()),
        ];
        if let Some(interval) = price.recurring_interval {
            form.push(("recurring[interval]", interval.to_string()));
        }

        let created: Created = self.send(self.http.post(self.url("prices")).form(&form)).await?;
        Ok(created.id)
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let form = checkout_form(request);
        let session: CheckoutSession = self
            .send(self.http.post(self.url("checkout/sessions")).form(&form))
            .await?;

        if session.url.is_none() {
            return Err(ProviderError::MissingField("url"));
        }
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, ProviderError> {
        self.send(self.http.get(self.url(&format!("checkout/sessions/{id}"))))
            .await
    }

    async fn cancel_subscription(&self, id: &str) -> Result<(), ProviderError> {
        let _: Created = self
            .send(self.http.delete(self.url(&format!("subscriptions/{id}"))))
            .await?;
        Ok(())
    }
}
