use serde_json::Value;
use sqlx::Result as SqlxResult;

use crate::{db::Db, models::WebhookEventRow};

#[derive(Debug, Clone)]
pub enum DeliveryRecord {
    /// First delivery, or an earlier delivery that did not finish.
    Pending(WebhookEventRow),
    /// Already applied successfully; nothing to do.
    AlreadyProcessed(WebhookEventRow),
}

#[derive(Clone)]
pub struct WebhookEventRepo {
    pool: Db,
}

impl WebhookEventRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Records a delivery keyed by the provider's event id.
    pub async fn record(
        &self,
        provider_event_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> SqlxResult<DeliveryRecord> {
        let row = sqlx::query_as::<_, WebhookEventRow>(
            r#"
            INSERT INTO webhook_events (provider_event_id, event_type, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider_event_id) DO UPDATE
            SET event_type = EXCLUDED.event_type
            RETURNING *
            "#,
        )
        .bind(provider_event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(if row.processed {
            DeliveryRecord::AlreadyProcessed(row)
        } else {
            DeliveryRecord::Pending(row)
        })
    }

    pub async fn mark_processed(&self, provider_event_id: &str) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = TRUE, processing_error = NULL, processed_at = NOW()
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(&self, provider_event_id: &str, error: &str) -> SqlxResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = FALSE, processing_error = $2
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, provider_event_id: &str) -> SqlxResult<Option<WebhookEventRow>> {
        sqlx::query_as::<_, WebhookEventRow>(
            "SELECT * FROM webhook_events WHERE provider_event_id = $1",
        )
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await
    }
}
