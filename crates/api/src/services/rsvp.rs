use tracing::{debug, info};
use uuid::Uuid;

use infra::capacity;
use infra::models::{RegistrationRow, UserRow};
use infra::repos::{EventRepo, MembershipRepo, RegistrationRepo};
use infra::rsvp::{transition, Action, RsvpStatus, UserTarget};

use super::{ChangeCause, RegistrationChange};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct RsvpOutcome {
    pub registration: RegistrationRow,
    /// The registrant must complete checkout before the seat is confirmed.
    pub requires_payment: bool,
}

pub struct RsvpService {
    state: AppState,
}

impl RsvpService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Applies a registrant's request for `going` or `not_going`.
    ///
    /// Asking for `going` requires an active membership in the event's club;
    /// the club organizer is exempt. Withdrawing is always allowed.
    ///
    /// Lock order is event row, then registration row. The reserved count is
    /// read after both locks, so two requests racing for the last seat cannot
    /// both see it free.
    pub async fn set_rsvp(
        &self,
        user: &UserRow,
        event_id: Uuid,
        requested: RsvpStatus,
    ) -> Result<RsvpOutcome, AppError> {
        let target = UserTarget::try_from(requested)?;

        let mut tx = self.state.db.begin().await?;

        let event = EventRepo::lock(&mut *tx, event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("event".to_string()))?;

        if target == UserTarget::Going
            && !MembershipRepo::has_access(&mut *tx, user.id, event.club_id).await?
        {
            return Err(AppError::Forbidden("club membership required".to_string()));
        }

        let current = RegistrationRepo::lock(&mut *tx, event_id, user.id).await?;
        let current_status = current.as_ref().map(|row| row.status()).transpose()?;

        let step = transition(Action::Request(target), current_status, event.policy())?;

        if step.needs_seat {
            let reserved = capacity::count_reserved(&mut *tx, event_id).await?;
            capacity::ensure_seat(reserved, event.max_capacity)?;
        }

        let registration = match current {
            Some(row) if step.is_noop() => {
                debug!(%event_id, user_id = %user.id, status = %step.to, "rsvp unchanged");
                row
            }
            _ => {
                RegistrationRepo::upsert_request(&mut *tx, event_id, user.id, step.to, step.needs_seat)
                    .await?
            }
        };

        tx.commit().await?;

        if !step.is_noop() {
            info!(
                %event_id,
                user_id = %user.id,
                from = ?step.from,
                to = %step.to,
                "rsvp updated"
            );
            self.state.publish_registration(RegistrationChange {
                event_id,
                user_id: user.id,
                status: step.to,
                cause: ChangeCause::Registrant,
            });
        }

        Ok(RsvpOutcome {
            registration,
            requires_payment: step.requires_payment(),
        })
    }

    pub async fn get(&self, event_id: Uuid, user_id: Uuid) -> Result<Option<RegistrationRow>, AppError> {
        Ok(RegistrationRepo::new(self.state.db.clone())
            .get(event_id, user_id)
            .await?)
    }
}
