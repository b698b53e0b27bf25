use crate::{db::Db, models::ClubRow};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateClub {
    pub organizer_id: Uuid,
    pub name: String,
    pub membership_price_cents: Option<i64>,
}

#[derive(Clone)]
pub struct ClubRepo {
    pool: Db,
}

impl ClubRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<ClubRow>> {
        sqlx::query_as::<_, ClubRow>("SELECT * FROM clubs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_by_organizer(&self, organizer_id: Uuid) -> SqlxResult<Vec<ClubRow>> {
        sqlx::query_as::<_, ClubRow>(
            r#"
            SELECT *
            FROM clubs
            WHERE organizer_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create(&self, data: CreateClub) -> SqlxResult<ClubRow> {
        sqlx::query_as::<_, ClubRow>(
            r#"
            INSERT INTO clubs (organizer_id, name, membership_price_cents)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(data.organizer_id)
        .bind(data.name)
        .bind(data.membership_price_cents)
        .fetch_one(&self.pool)
        .await
    }

    /// Stores provider identifiers for the membership price unless another
    /// request already did, then returns the stored row.
    pub async fn set_provider_ids(
        &self,
        id: Uuid,
        product_id: &str,
        price_id: &str,
    ) -> SqlxResult<Option<ClubRow>> {
        let updated = sqlx::query_as::<_, ClubRow>(
            r#"
            UPDATE clubs
            SET provider_product_id = $2, provider_price_id = $3, updated_at = NOW()
            WHERE id = $1 AND provider_price_id IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(product_id)
        .bind(price_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(Some(row)),
            None => self.get(id).await,
        }
    }

    /// Removes the club; events, registrations and memberships cascade.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> SqlxResult<bool> {
        let result = sqlx::query("DELETE FROM clubs WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
