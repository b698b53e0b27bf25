use serde_json::json;
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use infra::models::{AuditRow, EventRow, RegistrationRow, UserRow};
use infra::pagination::LimitOffset;
use infra::repos::{AuditRepo, NewAuditEntry, RegistrationRepo};
use infra::rsvp::{transition, Action, RsvpStatus, TransitionError};

use super::{ChangeCause, RegistrationChange};
use crate::auth::permissions::require_organized_event;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn action(&self) -> Action {
        match self {
            Decision::Approve => Action::Approve,
            Decision::Reject => Action::Reject,
        }
    }

    fn audit_action(&self) -> &'static str {
        match self {
            Decision::Approve => "registration.approved",
            Decision::Reject => "registration.rejected",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub registration: RegistrationRow,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub updated: Vec<RegistrationRow>,
    /// Ids with no registration pending approval.
    pub skipped: Vec<Uuid>,
}

/// What the registrant should hear about the decision.
pub fn outcome_message(status: RsvpStatus) -> &'static str {
    match status {
        RsvpStatus::Going => "Registration approved; attendance confirmed",
        RsvpStatus::ApprovedPendingPayment => "Registration approved; awaiting payment",
        RsvpStatus::Rejected => "Registration rejected",
        _ => "Registration updated",
    }
}

pub struct ApprovalService {
    state: AppState,
}

impl ApprovalService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn list_pending(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<RegistrationRow>, AppError> {
        require_organized_event(&self.state, actor.id, club_id, event_id).await?;
        Ok(RegistrationRepo::new(self.state.db.clone())
            .list_pending(event_id)
            .await?)
    }

    /// Every registration for the event, rejected ones included.
    pub async fn history(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
        status: Option<RsvpStatus>,
        page: Option<LimitOffset>,
    ) -> Result<Vec<RegistrationRow>, AppError> {
        require_organized_event(&self.state, actor.id, club_id, event_id).await?;
        Ok(RegistrationRepo::new(self.state.db.clone())
            .list_by_event(event_id, status, page)
            .await?)
    }

    /// Decisions recorded for the event, oldest first.
    pub async fn audit_trail(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<AuditRow>, AppError> {
        require_organized_event(&self.state, actor.id, club_id, event_id).await?;
        Ok(AuditRepo::new(self.state.db.clone())
            .list_for_event(event_id)
            .await?)
    }

    pub async fn approve(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<DecisionOutcome, AppError> {
        self.decide(actor, club_id, event_id, user_id, Decision::Approve, None)
            .await
    }

    pub async fn reject(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
    ) -> Result<DecisionOutcome, AppError> {
        self.decide(actor, club_id, event_id, user_id, Decision::Reject, reason.as_deref())
            .await
    }

    async fn decide(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
        decision: Decision,
        reason: Option<&str>,
    ) -> Result<DecisionOutcome, AppError> {
        let (_, event) = require_organized_event(&self.state, actor.id, club_id, event_id).await?;

        let mut tx = self.state.db.begin().await?;
        let registration = apply_decision(&mut *tx, actor, &event, user_id, decision, reason).await?;
        tx.commit().await?;

        let status = registration.status()?;
        info!(%event_id, %user_id, actor_id = %actor.id, %status, "registration decided");
        self.publish(&registration, status);

        Ok(DecisionOutcome {
            message: outcome_message(status).to_string(),
            registration,
        })
    }

    /// Applies the same decision to many registrants. Each id is checked on
    /// its own; ids that are not pending approval are skipped.
    pub async fn bulk_decide(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
        user_ids: &[Uuid],
        decision: Decision,
        reason: Option<&str>,
    ) -> Result<BulkOutcome, AppError> {
        let (_, event) = require_organized_event(&self.state, actor.id, club_id, event_id).await?;

        let mut outcome = BulkOutcome::default();
        let mut tx = self.state.db.begin().await?;

        for &user_id in user_ids {
            match apply_decision(&mut *tx, actor, &event, user_id, decision, reason).await {
                Ok(row) => outcome.updated.push(row),
                Err(AppError::NotFound(_)) => outcome.skipped.push(user_id),
                Err(e) => return Err(e),
            }
        }

        tx.commit().await?;

        info!(
            %event_id,
            actor_id = %actor.id,
            ?decision,
            updated = outcome.updated.len(),
            skipped = outcome.skipped.len(),
            "bulk decision applied"
        );
        for row in &outcome.updated {
            if let Ok(status) = row.status() {
                self.publish(row, status);
            }
        }

        Ok(outcome)
    }

    fn publish(&self, row: &RegistrationRow, status: RsvpStatus) {
        self.state.publish_registration(RegistrationChange {
            event_id: row.event_id,
            user_id: row.user_id,
            status,
            cause: ChangeCause::Organizer,
        });
    }
}

/// One decision inside the caller's transaction: lock, validate against the
/// transition table, conditional write, audit entry.
async fn apply_decision(
    conn: &mut PgConnection,
    actor: &UserRow,
    event: &EventRow,
    user_id: Uuid,
    decision: Decision,
    reason: Option<&str>,
) -> Result<RegistrationRow, AppError> {
    let current = RegistrationRepo::lock(&mut *conn, event.id, user_id).await?;
    let current_status = current.as_ref().map(|row| row.status()).transpose()?;
    let step = transition(decision.action(), current_status, event.policy())?;

    let updated = match decision {
        Decision::Approve => RegistrationRepo::approve(&mut *conn, event.id, user_id, step.to).await?,
        Decision::Reject => RegistrationRepo::reject(&mut *conn, event.id, user_id, reason).await?,
    };
    let Some(row) = updated else {
        // The lock above makes this unreachable unless the row vanished.
        warn!(event_id = %event.id, %user_id, "registration changed under lock");
        return Err(TransitionError::NotPendingApproval.into());
    };

    AuditRepo::append(
        &mut *conn,
        NewAuditEntry {
            actor_id: actor.id,
            club_id: event.club_id,
            event_id: Some(event.id),
            subject_user_id: Some(user_id),
            action: decision.audit_action(),
            detail: json!({
                "from": RsvpStatus::PendingApproval.as_str(),
                "to": step.to.as_str(),
                "reason": reason,
            }),
        },
    )
    .await?;

    Ok(row)
}
