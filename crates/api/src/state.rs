use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::auth::JwtService;
use crate::config::AppConfig;
use crate::payments::{PaymentProvider, StripeClient};
use crate::services::RegistrationChange;

const BROADCAST_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    jwt_service: JwtService,
    payments: Arc<dyn PaymentProvider>,
    registrations_tx: broadcast::Sender<RegistrationChange>,
}

impl AppState {
    pub fn new(db: PgPool, config: AppConfig, payments: Arc<dyn PaymentProvider>) -> Self {
        let jwt_service = JwtService::new(&config.jwt_secret);
        let (registrations_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            db,
            config: Arc::new(config),
            jwt_service,
            payments,
            registrations_tx,
        }
    }

    /// Production wiring: configuration from the environment and the Stripe
    /// client as payment provider.
    pub fn from_env(db: PgPool) -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let stripe = StripeClient::new(&config.stripe)?;
        Ok(Self::new(db, config, Arc::new(stripe)))
    }

    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    pub fn payments(&self) -> &dyn PaymentProvider {
        self.payments.as_ref()
    }

    pub fn subscribe_registrations(&self) -> broadcast::Receiver<RegistrationChange> {
        self.registrations_tx.subscribe()
    }

    /// Fire-and-forget; nobody listening is fine.
    pub fn publish_registration(&self, change: RegistrationChange) {
        let _ = self.registrations_tx.send(change);
    }
}
