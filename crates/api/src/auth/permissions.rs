use async_graphql::{Context, ErrorExtensions};
use uuid::Uuid;

use infra::models::{ClubRow, EventRow, UserRow};
use infra::repos::{ClubRepo, EventRepo, UserRepo};

use crate::auth::Claims;
use crate::error::AppError;
use crate::state::AppState;

/// Resolves the caller to an internal user, provisioning the row on first
/// sight of an identity-provider principal.
pub async fn current_user(state: &AppState, claims: Option<&Claims>) -> Result<UserRow, AppError> {
    let claims = claims.ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
    let user = UserRepo::new(state.db.clone())
        .provision(&claims.sub, claims.email.as_deref())
        .await?;
    Ok(user)
}

/// GraphQL flavour of `current_user`: reads the claims injected by the
/// HTTP layer.
pub async fn require_user(ctx: &Context<'_>) -> async_graphql::Result<UserRow> {
    let state = ctx.data::<AppState>()?;
    let claims = ctx.data_opt::<Claims>();
    current_user(state, claims).await.map_err(|e| e.extend())
}

/// Loads the club and checks the caller organizes it.
pub async fn require_organizer(
    state: &AppState,
    user_id: Uuid,
    club_id: Uuid,
) -> Result<ClubRow, AppError> {
    let club = ClubRepo::new(state.db.clone())
        .get(club_id)
        .await?
        .ok_or_else(|| AppError::NotFound("club".to_string()))?;

    if club.organizer_id != user_id {
        return Err(AppError::Forbidden("only the club organizer can do this".to_string()));
    }
    Ok(club)
}

/// Organizer check plus event-in-club check, in that order.
pub async fn require_organized_event(
    state: &AppState,
    user_id: Uuid,
    club_id: Uuid,
    event_id: Uuid,
) -> Result<(ClubRow, EventRow), AppError> {
    let club = require_organizer(state, user_id, club_id).await?;
    let event = EventRepo::new(state.db.clone())
        .get(event_id)
        .await?
        .filter(|event| event.club_id == club_id)
        .ok_or_else(|| AppError::NotFound("event".to_string()))?;
    Ok((club, event))
}
