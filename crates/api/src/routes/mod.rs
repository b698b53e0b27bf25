pub mod payments;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// REST endpoints called by the payment provider and by browsers returning
/// from checkout.
pub fn provider_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/payments/success", get(payments::checkout_success))
}
