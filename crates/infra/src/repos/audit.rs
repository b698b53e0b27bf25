use serde_json::Value;
use sqlx::{PgConnection, Result as SqlxResult};
use uuid::Uuid;

use crate::{db::Db, models::AuditRow};

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Uuid,
    pub club_id: Uuid,
    pub event_id: Option<Uuid>,
    pub subject_user_id: Option<Uuid>,
    pub action: &'static str,
    pub detail: Value,
}

#[derive(Clone)]
pub struct AuditRepo {
    pool: Db,
}

impl AuditRepo {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Appends on the caller's transaction so the entry commits or rolls
    /// back with the decision it records.
    pub async fn append(conn: &mut PgConnection, entry: NewAuditEntry) -> SqlxResult<AuditRow> {
        sqlx::query_as::<_, AuditRow>(
            r#"
            INSERT INTO audit_log (actor_id, club_id, event_id, subject_user_id, action, detail)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.club_id)
        .bind(entry.event_id)
        .bind(entry.subject_user_id)
        .bind(entry.action)
        .bind(entry.detail)
        .fetch_one(conn)
        .await
    }

    pub async fn list_for_event(&self, event_id: Uuid) -> SqlxResult<Vec<AuditRow>> {
        sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT *
            FROM audit_log
            WHERE event_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
    }
}
