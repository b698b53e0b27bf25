use crate::{db::Db, models::EventRow, pagination::LimitOffset};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub club_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub timezone: String,
    pub price_cents: Option<i64>,
    pub max_capacity: Option<i32>,
    pub requires_approval: bool,
}

/// Already-validated settings written by an organizer edit.
#[derive(Debug, Clone)]
pub struct EventSettings {
    pub price_cents: Option<i64>,
    pub max_capacity: Option<i32>,
    pub requires_approval: bool,
}

#[derive(Clone)]
pub struct EventRepo {
    pool: Db,
}

impl EventRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> SqlxResult<Option<EventRow>> {
        sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_by_club(
        &self,
        club_id: Uuid,
        page: Option<LimitOffset>,
    ) -> SqlxResult<Vec<EventRow>> {
        let p = page.unwrap_or_default();

        sqlx::query_as::<_, EventRow>(
            r#"
            SELECT *
            FROM events
            WHERE club_id = $1
            ORDER BY start_time ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(club_id)
        .bind(p.limit)
        .bind(p.offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create(&self, data: CreateEvent) -> SqlxResult<EventRow> {
        sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO events (club_id, title, start_time, timezone, price_cents, max_capacity, requires_approval)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(data.club_id)
        .bind(data.title)
        .bind(data.start_time)
        .bind(data.timezone)
        .bind(data.price_cents)
        .bind(data.max_capacity)
        .bind(data.requires_approval)
        .fetch_one(&self.pool)
        .await
    }

    /// Reads the event and holds its row lock until the transaction ends.
    /// Every capacity-gated write for the event goes through this lock.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> SqlxResult<Option<EventRow>> {
        sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// A changed price invalidates the provider price; it is recreated lazily
    /// on the next checkout.
    pub async fn update_settings(
        conn: &mut PgConnection,
        id: Uuid,
        settings: &EventSettings,
    ) -> SqlxResult<EventRow> {
        sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE events
            SET provider_price_id = CASE
                    WHEN price_cents IS DISTINCT FROM $2 THEN NULL
                    ELSE provider_price_id
                END,
                price_cents = $2,
                max_capacity = $3,
                requires_approval = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(settings.price_cents)
        .bind(settings.max_capacity)
        .bind(settings.requires_approval)
        .fetch_one(conn)
        .await
    }

    /// Stores provider identifiers unless another request already did.
    /// Returns the row as stored, whichever writer won.
    pub async fn set_provider_ids(
        &self,
        id: Uuid,
        product_id: &str,
        price_id: &str,
    ) -> SqlxResult<Option<EventRow>> {
        let updated = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE events
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
}
