use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use infra::models::UserRow;
use infra::repos::{AuditRepo, ClubRepo, MembershipRepo, NewAuditEntry};

use crate::auth::permissions::require_organizer;
use crate::error::AppError;
use crate::state::AppState;

/// Result of a best-effort teardown. Provider problems end up in
/// `warnings`; they never block the local deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub deleted: bool,
    pub warnings: Vec<String>,
}

pub struct ClubService {
    state: AppState,
}

impl ClubService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Cancels the club's provider subscriptions, then deletes the club with
    /// its events, registrations and memberships.
    pub async fn delete_club(&self, actor: &UserRow, club_id: Uuid) -> Result<CleanupOutcome, AppError> {
        let club = require_organizer(&self.state, actor.id, club_id).await?;

        let subscription_ids = MembershipRepo::new(self.state.db.clone())
            .subscription_ids_for_club(club_id)
            .await?;

        let mut outcome = CleanupOutcome::default();
        let mut cancelled = 0usize;
        for subscription_id in &subscription_ids {
            match self.state.payments().cancel_subscription(subscription_id).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    warn!(%club_id, %subscription_id, error = %e, "could not cancel subscription");
                    outcome
                        .warnings
                        .push(format!("subscription {subscription_id} was not cancelled"));
                }
            }
        }

        let mut tx = self.state.db.begin().await?;
        outcome.deleted = ClubRepo::delete(&mut *tx, club_id).await?;
        if outcome.deleted {
            AuditRepo::append(
                &mut *tx,
                NewAuditEntry {
                    actor_id: actor.id,
                    club_id,
                    event_id: None,
                    subject_user_id: None,
                    action: "club.deleted",
                    detail: json!({
                        "name": club.name,
                        "subscriptions": subscription_ids.len(),
                        "cancelled": cancelled,
                        "warnings": outcome.warnings,
                    }),
                },
            )
            .await?;
        }
        tx.commit().await?;

        info!(
            %club_id,
            actor_id = %actor.id,
            deleted = outcome.deleted,
            warnings = outcome.warnings.len(),
            "club deleted"
        );
        Ok(outcome)
    }
}
