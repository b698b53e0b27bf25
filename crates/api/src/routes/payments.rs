use axum::{
    extract::{Query, State},
    response::Redirect,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::payments::CheckoutMetadata;
use crate::services::Reconciler;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: String,
}

/// Browser return from checkout. Applies the payment synchronously when the
/// webhook has not arrived yet, then sends the user back to the event or
/// club page.
pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<Redirect, AppError> {
    let session = state
        .payments()
        .retrieve_checkout_session(&query.session_id)
        .await?;

    let target = match CheckoutMetadata::from_map(&session.metadata) {
        Ok(CheckoutMetadata::EventRsvp { event_id, .. }) => {
            let applied = Reconciler::new(state.clone())
                .apply_session_payment(&session, Utc::now())
                .await?;
            info!(%event_id, session_id = %session.id, confirmed = applied.is_some(), "checkout return");
            state.config.event_url(event_id)
        }
        // Membership activation is left to the completed-checkout webhook; the
        // redirect only returns the user to the club.
        Ok(CheckoutMetadata::ClubMembership { club_id, .. }) => state.config.club_url(club_id),
        Err(e) => return Err(AppError::BadRequest(format!("unknown checkout session: {e}"))),
    };

    Ok(Redirect::to(&target))
}
