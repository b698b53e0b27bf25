use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::rsvp::{EventPolicy, RsvpStatus};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRow {
    pub id: Uuid,
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub payments_enabled: bool,
    pub provider_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClubRow {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub membership_price_cents: Option<i64>,
    pub provider_product_id: Option<String>,
    pub provider_price_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventRow {
    pub id: Uuid,
    pub club_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub timezone: String,
    pub price_cents: Option<i64>,
    pub max_capacity: Option<i32>,
    pub requires_approval: bool,
    pub provider_product_id: Option<String>,
    pub provider_price_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRow {
    pub fn policy(&self) -> EventPolicy {
        EventPolicy::new(self.price_cents, self.requires_approval)
    }

    pub fn is_paid(&self) -> bool {
        self.policy().paid
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RegistrationRow {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount_cents: Option<i64>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationRow {
    /// Parsed status. The column is constrained by a CHECK, so an unknown
    /// value means the schema and this crate disagree.
    pub fn status(&self) -> Result<RsvpStatus, crate::rsvp::UnknownStatus> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MembershipRow {
    pub user_id: Uuid,
    pub club_id: Uuid,
    pub status: String,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub last_provider_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub club_id: Uuid,
    pub event_id: Option<Uuid>,
    pub subject_user_id: Option<Uuid>,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEventRow {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
