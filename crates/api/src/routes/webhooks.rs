use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::error::AppError;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::services::{DeliveryOutcome, Reconciler};
use crate::state::AppState;

#[derive(Serialize)]
pub struct WebhookAck {
    received: bool,
    duplicate: bool,
}

/// The body must stay raw bytes: the signature covers the exact payload.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = Reconciler::new(state).handle_delivery(&body, signature).await?;

    Ok((
        StatusCode::OK,
        Json(WebhookAck {
            received: true,
            duplicate: outcome == DeliveryOutcome::Duplicate,
        }),
    ))
}
