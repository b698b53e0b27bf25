use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

use crate::{db::Db, models::RegistrationRow, pagination::LimitOffset, rsvp::RsvpStatus};

/// Provider identifiers recorded when a payment is confirmed.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfirmation {
    pub amount_cents: Option<i64>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

fn status_list(statuses: &[RsvpStatus]) -> Vec<&'static str> {
    statuses.iter().map(|s| s.as_str()).collect()
}

#[derive(Clone)]
pub struct RegistrationRepo {
    pool: Db,
}

impl RegistrationRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, event_id: Uuid, user_id: Uuid) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            "SELECT * FROM event_registrations WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// All registrations for an event, optionally narrowed to one status,
    /// oldest first. Rejected and cancelled rows are included.
    pub async fn list_by_event(
        &self,
        event_id: Uuid,
        status: Option<RsvpStatus>,
        page: Option<LimitOffset>,
    ) -> SqlxResult<Vec<RegistrationRow>> {
        let p = page.unwrap_or_default();

        sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT *
            FROM event_registrations
            WHERE event_id = $1
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at ASC, user_id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(event_id)
        .bind(status.map(|s| s.as_str()))
        .bind(p.limit)
        .bind(p.offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_pending(&self, event_id: Uuid) -> SqlxResult<Vec<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT *
            FROM event_registrations
            WHERE event_id = $1 AND status = 'pending_approval'
            ORDER BY created_at ASC, user_id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Reads the row and holds its lock until the transaction ends.
    pub async fn lock(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
    ) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            SELECT *
            FROM event_registrations
            WHERE event_id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
    }

    /// Creates or overwrites the registrant's row. When `fresh_entry` is set
    /// the previous decision and checkout are cleared so the request goes
    /// through approval and payment from the top; paid amounts stay as history.
    pub async fn upsert_request(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
        status: RsvpStatus,
        fresh_entry: bool,
    ) -> SqlxResult<RegistrationRow> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            INSERT INTO event_registrations (event_id, user_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id, user_id) DO UPDATE
            SET status = EXCLUDED.status,
                approved_at = CASE WHEN $4 THEN NULL ELSE event_registrations.approved_at END,
                rejected_at = CASE WHEN $4 THEN NULL ELSE event_registrations.rejected_at END,
                rejection_reason = CASE WHEN $4 THEN NULL ELSE event_registrations.rejection_reason END,
                checkout_session_id = CASE WHEN $4 THEN NULL ELSE event_registrations.checkout_session_id END,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(fresh_entry)
        .fetch_one(conn)
        .await
    }

    /// Organizer approval. Only touches a row that is still pending approval.
    pub async fn approve(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
        to: RsvpStatus,
    ) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            UPDATE event_registrations
            SET status = $3, approved_at = NOW(), updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status = 'pending_approval'
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(to.as_str())
        .fetch_optional(conn)
        .await
    }

    /// Organizer rejection. Only touches a row that is still pending approval.
    pub async fn reject(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
        reason: Option<&str>,
    ) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            UPDATE event_registrations
            SET status = 'rejected', rejected_at = NOW(), rejection_reason = $3, updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status = 'pending_approval'
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(reason)
        .fetch_optional(conn)
        .await
    }

    /// Provider-confirmed payment. Conditional on the row still awaiting
    /// payment, so a replayed confirmation updates nothing.
    pub async fn mark_paid(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
        payment: &PaymentConfirmation,
    ) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            UPDATE event_registrations
            SET status = 'going',
                paid_at = COALESCE($4, NOW()),
                paid_amount_cents = $5,
                checkout_session_id = COALESCE($6, checkout_session_id),
                payment_intent_id = COALESCE($7, payment_intent_id),
                updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status = ANY($3)
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status_list(&RsvpStatus::AWAITING_PAYMENT))
        .bind(payment.paid_at)
        .bind(payment.amount_cents)
        .bind(payment.checkout_session_id.as_deref())
        .bind(payment.payment_intent_id.as_deref())
        .fetch_optional(conn)
        .await
    }

    pub async fn mark_payment_failed(
        conn: &mut PgConnection,
        event_id: Uuid,
        user_id: Uuid,
    ) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            UPDATE event_registrations
            SET status = 'payment_failed', updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status = 'pending_payment'
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
    }

    /// Remembers the provider session for a registration awaiting payment.
    /// Does not change the status.
    pub async fn set_checkout_session(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        session_id: &str,
    ) -> SqlxResult<Option<RegistrationRow>> {
        sqlx::query_as::<_, RegistrationRow>(
            r#"
            UPDATE event_registrations
            SET checkout_session_id = $3, updated_at = NOW()
            WHERE event_id = $1 AND user_id = $2 AND status = ANY($4)
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(session_id)
        .bind(status_list(&RsvpStatus::AWAITING_PAYMENT))
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn count_with_status(
        conn: &mut PgConnection,
        event_id: Uuid,
        status: RsvpStatus,
    ) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = $1 AND status = $2",
        )
        .bind(event_id)
        .bind(status.as_str())
        .fetch_one(conn)
        .await
    }
}
