use sqlx::{PgPool, Result};
use uuid::Uuid;

use crate::models::UserRow;

#[derive(Clone)]
pub struct UserRepo {
    db: PgPool,
}

impl UserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Maps an identity-provider principal to an internal user, creating the
    /// user on first sight. Safe to call on every request.
    pub async fn provision(&self, external_id: &str, email: Option<&str>) -> Result<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (external_id, email)
            VALUES ($1, $2)
            ON CONFLICT (external_id) DO UPDATE
            SET email = COALESCE(EXCLUDED.email, users.email),
                updated_at = CASE
                    WHEN users.email IS DISTINCT FROM COALESCE(EXCLUDED.email, users.email) THEN NOW()
                    ELSE users.updated_at
                END
            RETURNING *
            "#,
        )
        .bind(external_id)
        .bind(email)
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row)
    }

    /// Organizer payout settings: whether payments are accepted and the
    /// connected sub-account receiving settlement.
    pub async fn set_payment_settings(
        &self,
        id: Uuid,
        payments_enabled: bool,
        provider_account_id: Option<&str>,
    ) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET payments_enabled = $2, provider_account_id = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payments_enabled)
        .bind(provider_account_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}
