use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub stripe: StripeConfig,
    /// Platform share of connected-account payments, in percent.
    pub platform_fee_percent: f64,
    /// Browser-facing origin used to build checkout return URLs.
    pub public_base_url: String,
    pub currency: String,
    pub webhook_tolerance: Duration,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let platform_fee_percent: f64 = optional("PLATFORM_FEE_PERCENT", 0.0)?;
        if !(0.0..=100.0).contains(&platform_fee_percent) {
            bail!("PLATFORM_FEE_PERCENT must be between 0 and 100");
        }

        Ok(Self {
            port: optional("PORT", 8080)?,
            jwt_secret: required("JWT_SECRET")?,
            stripe: StripeConfig {
                secret_key: required("STRIPE_SECRET_KEY")?,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
                api_base: optional("STRIPE_API_BASE", "https://api.stripe.com".to_string())?,
                timeout: Duration::from_secs(optional("PROVIDER_TIMEOUT_SECS", 15)?),
            },
            platform_fee_percent,
            public_base_url: optional("PUBLIC_BASE_URL", "http://localhost:3000".to_string())?
                .trim_end_matches('/')
                .to_string(),
            currency: optional("CURRENCY", "eur".to_string())?.to_lowercase(),
            webhook_tolerance: Duration::from_secs(optional("WEBHOOK_TOLERANCE_SECS", 300)?),
        })
    }

    pub fn event_url(&self, event_id: uuid::Uuid) -> String {
        format!("{}/events/{}", self.public_base_url, event_id)
    }

    pub fn club_url(&self, club_id: uuid::Uuid) -> String {
        format!("{}/clubs/{}", self.public_base_url, club_id)
    }
}
