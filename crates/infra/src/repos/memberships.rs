use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

use crate::{db::Db, models::MembershipRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Active,
    Inactive,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Inactive => "inactive",
        }
    }
}

/// Result of applying a provider subscription event to the local row.
#[derive(Debug, Clone)]
pub enum SubscriptionWrite {
    Applied(MembershipRow),
    /// A newer provider event was already applied; this one is out of date.
    Stale,
    /// No membership carries this subscription id.
    Unknown,
}

#[derive(Clone)]
pub struct MembershipRepo {
    pool: Db,
}

impl MembershipRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid, club_id: Uuid) -> SqlxResult<Option<MembershipRow>> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM club_memberships WHERE user_id = $1 AND club_id = $2",
        )
        .bind(user_id)
        .bind(club_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Whether the user may register for the club's events: its organizer,
    /// or a member whose membership is active.
    pub async fn has_access(
        conn: &mut PgConnection,
        user_id: Uuid,
        club_id: Uuid,
    ) -> SqlxResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM clubs WHERE id = $2 AND organizer_id = $1
            ) OR EXISTS (
                SELECT 1 FROM club_memberships
                WHERE user_id = $1 AND club_id = $2 AND status = 'active'
            )
            "#,
        )
        .bind(user_id)
        .bind(club_id)
        .fetch_one(conn)
        .await
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> SqlxResult<Vec<MembershipRow>> {
        sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT *
            FROM club_memberships
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Subscription ids still attached to a club's memberships.
    pub async fn subscription_ids_for_club(&self, club_id: Uuid) -> SqlxResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT provider_subscription_id
            FROM club_memberships
            WHERE club_id = $1 AND provider_subscription_id IS NOT NULL
            "#,
        )
        .bind(club_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Free membership: active immediately, no provider involvement.
    pub async fn activate_free(&self, user_id: Uuid, club_id: Uuid) -> SqlxResult<MembershipRow> {
        sqlx::query_as::<_, MembershipRow>(
            r#"
            INSERT INTO club_memberships (user_id, club_id, status)
            VALUES ($1, $2, 'active')
            ON CONFLICT (user_id, club_id) DO UPDATE
            SET status = 'active', updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(club_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Insert-or-update keyed by (user, club) after a completed subscription
    /// checkout. Ignored when a newer provider event was already applied.
    pub async fn activate_from_checkout(
        &self,
        user_id: Uuid,
        club_id: Uuid,
        subscription_id: Option<&str>,
        event_at: DateTime<Utc>,
    ) -> SqlxResult<Option<MembershipRow>> {
        sqlx::query_as::<_, MembershipRow>(
            r#"
            INSERT INTO club_memberships (user_id, club_id, status, provider_subscription_id, last_provider_event_at)
            VALUES ($1, $2, 'active', $3, $4)
            ON CONFLICT (user_id, club_id) DO UPDATE
            SET status = 'active',
                provider_subscription_id = COALESCE(EXCLUDED.provider_subscription_id, club_memberships.provider_subscription_id),
                last_provider_event_at = EXCLUDED.last_provider_event_at,
                updated_at = NOW()
            WHERE club_memberships.last_provider_event_at IS NULL
               OR club_memberships.last_provider_event_at <= EXCLUDED.last_provider_event_at
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(club_id)
        .bind(subscription_id)
        .bind(event_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Writes the provider-reported state for a subscription. Events older
    /// than the last one applied are ignored.
    pub async fn apply_subscription_state(
        &self,
        subscription_id: &str,
        status: MembershipStatus,
        current_period_end: Option<DateTime<Utc>>,
        event_at: DateTime<Utc>,
    ) -> SqlxResult<SubscriptionWrite> {
        let applied = sqlx::query_as::<_, MembershipRow>(
            r#"
            UPDATE club_memberships
            SET status = $2,
                current_period_end = COALESCE($3, current_period_end),
                last_provider_event_at = $4,
                updated_at = NOW()
            WHERE provider_subscription_id = $1
              AND (last_provider_event_at IS NULL OR last_provider_event_at <= $4)
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(status.as_str())
        .bind(current_period_end)
        .bind(event_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = applied {
            return Ok(SubscriptionWrite::Applied(row));
        }

        let known: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM club_memberships WHERE provider_subscription_id = $1)",
        )
        .bind(subscription_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if known { SubscriptionWrite::Stale } else { SubscriptionWrite::Unknown })
    }
}
