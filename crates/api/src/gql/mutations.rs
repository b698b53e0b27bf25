use async_graphql::{Context, ErrorExtensions, Object, Result, ID};

use infra::repos::UserRepo;

use crate::auth::permissions::require_user;
use crate::error::AppError;
use crate::gql::types::{
    maybe, parse_id, BulkDecisionPayload, CheckoutPayload, CleanupPayload, CreateEventInput,
    DecideRegistrationsInput, DecisionAction, DecisionPayload, Event, Membership,
    MembershipCheckoutPayload, RsvpPayload, SetRsvpInput, UpdateEventSettingsInput,
};
use crate::services::{
    ApprovalService, CheckoutService, ClubService, Decision, EventService, MembershipCheckout,
    NewEvent, RsvpService, SettingsChange,
};
use crate::state::AppState;

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Registrant asks to attend (`GOING`) or withdraws (`NOT_GOING`).
    async fn set_rsvp(&self, ctx: &Context<'_>, input: SetRsvpInput) -> Result<RsvpPayload> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let event_id = parse_id(&input.event_id, "eventId")?;

        let outcome = RsvpService::new(state.clone())
            .set_rsvp(&user, event_id, input.status.into())
            .await
            .map_err(|e| e.extend())?;
        RsvpPayload::try_from(outcome).map_err(|e| e.extend())
    }

    async fn create_event_checkout(&self, ctx: &Context<'_>, event_id: ID) -> Result<CheckoutPayload> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let event_id = parse_id(&event_id, "eventId")?;

        let link = CheckoutService::new(state.clone())
            .create_event_checkout(&user, event_id)
            .await
            .map_err(|e| e.extend())?;
        Ok(link.into())
    }

    async fn approve_registration(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
        event_id: ID,
        user_id: ID,
    ) -> Result<DecisionPayload> {
        let actor = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let outcome = ApprovalService::new(state.clone())
            .approve(
                &actor,
                parse_id(&club_id, "clubId")?,
                parse_id(&event_id, "eventId")?,
                parse_id(&user_id, "userId")?,
            )
            .await
            .map_err(|e| e.extend())?;
        DecisionPayload::try_from(outcome).map_err(|e| e.extend())
    }

    async fn reject_registration(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
        event_id: ID,
        user_id: ID,
        reason: Option<String>,
    ) -> Result<DecisionPayload> {
        let actor = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let outcome = ApprovalService::new(state.clone())
            .reject(
                &actor,
                parse_id(&club_id, "clubId")?,
                parse_id(&event_id, "eventId")?,
                parse_id(&user_id, "userId")?,
                reason,
            )
            .await
            .map_err(|e| e.extend())?;
        DecisionPayload::try_from(outcome).map_err(|e| e.extend())
    }

    /// Same decision for many registrants; ids not pending approval are
    /// reported in `skippedUserIds`.
    async fn decide_registrations(
        &self,
        ctx: &Context<'_>,
        input: DecideRegistrationsInput,
    ) -> Result<BulkDecisionPayload> {
        let actor = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;
        let user_ids = input
            .user_ids
            .iter()
            .map(|id| parse_id(id, "userIds"))
            .collect::<Result<Vec<_>>>()?;
        let decision = match input.action {
            DecisionAction::Approve => Decision::Approve,
            DecisionAction::Reject => Decision::Reject,
        };

        let outcome = ApprovalService::new(state.clone())
            .bulk_decide(
                &actor,
                parse_id(&input.club_id, "clubId")?,
                parse_id(&input.event_id, "eventId")?,
                &user_ids,
                decision,
                input.reason.as_deref(),
            )
            .await
            .map_err(|e| e.extend())?;
        BulkDecisionPayload::try_from(outcome).map_err(|e| e.extend())
    }

    async fn create_event(&self, ctx: &Context<'_>, input: CreateEventInput) -> Result<Event> {
        let actor = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let row = EventService::new(state.clone())
            .create_event(
                &actor,
                NewEvent {
                    club_id: parse_id(&input.club_id, "clubId")?,
                    title: input.title,
                    start_time: input.start_time,
                    timezone: input.timezone,
                    price_cents: input.price.map(|m| m.0),
                    max_capacity: input.max_capacity,
                    requires_approval: input.requires_approval,
                },
            )
            .await
            .map_err(|e| e.extend())?;
        Ok(row.into())
    }

    async fn update_event_settings(
        &self,
        ctx: &Context<'_>,
        input: UpdateEventSettingsInput,
    ) -> Result<Event> {
        let actor = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let row = EventService::new(state.clone())
            .update_event_settings(
                &actor,
                parse_id(&input.club_id, "clubId")?,
                parse_id(&input.event_id, "eventId")?,
                SettingsChange {
                    price_cents: maybe(input.price, |m| m.0),
                    max_capacity: maybe(input.max_capacity, |n| n),
                    requires_approval: input.requires_approval,
                },
            )
            .await
            .map_err(|e| e.extend())?;
        Ok(row.into())
    }

    /// Joins a club. Free clubs activate immediately; paid clubs return a
    /// subscription checkout.
    async fn create_membership_checkout(
        &self,
        ctx: &Context<'_>,
        club_id: ID,
    ) -> Result<MembershipCheckoutPayload> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let outcome = CheckoutService::new(state.clone())
            .create_membership_checkout(&user, parse_id(&club_id, "clubId")?)
            .await
            .map_err(|e| e.extend())?;

        Ok(match outcome {
            MembershipCheckout::Activated(row) => MembershipCheckoutPayload {
                membership: Some(Membership::from(row)),
                checkout: None,
            },
            MembershipCheckout::Redirect(link) => MembershipCheckoutPayload {
                membership: None,
                checkout: Some(CheckoutPayload::from(link)),
            },
        })
    }

    async fn delete_club(&self, ctx: &Context<'_>, club_id: ID) -> Result<CleanupPayload> {
        let actor = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let outcome = ClubService::new(state.clone())
            .delete_club(&actor, parse_id(&club_id, "clubId")?)
            .await
            .map_err(|e| e.extend())?;
        Ok(outcome.into())
    }

    /// Organizer payout settings. `accountId` is the connected sub-account
    /// receiving settlement; without one the platform keeps the full amount.
    async fn update_payment_settings(
        &self,
        ctx: &Context<'_>,
        enabled: bool,
        account_id: Option<String>,
    ) -> Result<bool> {
        let user = require_user(ctx).await?;
        let state = ctx.data::<AppState>()?;

        let account_id = account_id.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        UserRepo::new(state.db.clone())
            .set_payment_settings(user.id, enabled, account_id.as_deref())
            .await
            .map_err(|e| AppError::from(e).extend())?
            .ok_or_else(|| AppError::NotFound("user".to_string()).extend())?;
        Ok(enabled)
    }
}
