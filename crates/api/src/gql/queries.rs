use async_graphql::{Context, ErrorExtensions, Object, Result, ID};

use infra::capacity;
use infra::pagination::LimitOffset;
use infra::repos::{ClubRepo, EventRepo, MembershipRepo};

use crate::auth::permissions::require_user;
use crate::error::AppError;
use crate::gql::types::{
    parse_id, registrations, AuditEntry, CapacityInfo, Club, Event, Membership, Registration, RsvpStatus,
};
use crate::services::{ApprovalService, RsvpService};
use crate::state::AppState;

fn db_error(e: sqlx::Error) -> async_graphql::Error {
    AppError::from(e).extend()
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn event(&self, ctx: &Context<'_>, id: ID) -> Result<Option<Event>> {
        let state = ctx.data::<AppState>()?;
        let id = parse_id(&id, "id")?;
        let row = EventRepo::new(state.db.clone()).get(id).await.map_err(db_error)?;
        Ok(row.map(Event::from))
    }

    async fn club_events(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Event>> {
        let state = ctx.data::<AppState>()?;
        let club_id = parse_id(&club_id, "clubId")?;
        let rows = EventRepo::new(state.db.clone())
            .list_by_club(club_id, Some(LimitOffset::from_args(limit, offset)))
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn event_capacity(&self, ctx: &Context<'_>, event_id: ID) -> Result<CapacityInfo> {
        let state = ctx.data::<AppState>()?;
        let event_id = parse_id(&event_id, "eventId")?;
        let event = EventRepo::new(state.db.clone())
            .get(event_id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::NotFound("event".to_string()).extend())?;
        let snapshot = capacity::snapshot(&state.db, event.id, event.max_capacity)
            .await
            .map_err(db_error)?;
        Ok(snapshot.into())
    }

    /// The caller's own registration; `null` means not registered.
    async fn my_registration(&self, ctx: &Context<'_>, event_id: ID) -> Result<Option<Registration>> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let event_id = parse_id(&event_id, "eventId")?;
        let row = RsvpService::new(state.clone())
            .get(event_id, user.id)
            .await
            .map_err(|e| e.extend())?;
        row.map(Registration::try_from)
            .transpose()
            .map_err(|e| e.extend())
    }

    async fn my_memberships(&self, ctx: &Context<'_>) -> Result<Vec<Membership>> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let rows = MembershipRepo::new(state.db.clone())
            .list_for_user(user.id)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    /// Clubs the caller organizes.
    async fn my_clubs(&self, ctx: &Context<'_>) -> Result<Vec<Club>> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let rows = ClubRepo::new(state.db.clone())
            .list_by_organizer(user.id)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Club::from).collect())
    }

    /// Organizer view of registrations awaiting a decision.
    async fn pending_registrations(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
        event_id: ID,
    ) -> Result<Vec<Registration>> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let rows = ApprovalService::new(state.clone())
            .list_pending(
                &user,
                parse_id(&club_id, "clubId")?,
                parse_id(&event_id, "eventId")?,
            )
            .await
            .map_err(|e| e.extend())?;
        registrations(rows)
    }

    /// Organizer view of every registration, rejected ones included.
    async fn registration_history(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
        event_id: ID,
        status: Option<RsvpStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Registration>> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let rows = ApprovalService::new(state.clone())
            .history(
                &user,
                parse_id(&club_id, "clubId")?,
                parse_id(&event_id, "eventId")?,
                status.map(Into::into),
                Some(LimitOffset::from_args(limit, offset)),
            )
            .await
            .map_err(|e| e.extend())?;
        registrations(rows)
    }

    async fn registration_audit(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
        event_id: ID,
    ) -> Result<Vec<AuditEntry>> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let rows = ApprovalService::new(state.clone())
            .audit_trail(
                &user,
                parse_id(&club_id, "clubId")?,
                parse_id(&event_id, "eventId")?,
            )
            .await
            .map_err(|e| e.extend())?;
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
