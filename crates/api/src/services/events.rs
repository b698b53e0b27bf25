use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use infra::capacity;
use infra::event_rules::{
    check_price_change, normalize_price, validate_max_capacity, validate_timezone,
};
use infra::models::{EventRow, UserRow};
use infra::repos::{CreateEvent, EventRepo, EventSettings, RegistrationRepo};
use infra::rsvp::RsvpStatus;

use crate::auth::permissions::{require_organized_event, require_organizer};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub club_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub timezone: String,
    pub price_cents: Option<i64>,
    pub max_capacity: Option<i32>,
    pub requires_approval: bool,
}

/// A partial settings edit. `None` leaves the field as is; `Some(None)`
/// clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct SettingsChange {
    pub price_cents: Option<Option<i64>>,
    pub max_capacity: Option<Option<i32>>,
    pub requires_approval: Option<bool>,
}

pub struct EventService {
    state: AppState,
}

impl EventService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn create_event(&self, actor: &UserRow, input: NewEvent) -> Result<EventRow, AppError> {
        require_organizer(&self.state, actor.id, input.club_id).await?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("title", "title cannot be empty"));
        }
        validate_timezone(&input.timezone)?;
        let price_cents = normalize_price(input.price_cents)?;
        let max_capacity = validate_max_capacity(input.max_capacity)?;

        let event = EventRepo::new(self.state.db.clone())
            .create(CreateEvent {
                club_id: input.club_id,
                title: title.to_string(),
                start_time: input.start_time,
                timezone: input.timezone,
                price_cents,
                max_capacity,
                requires_approval: input.requires_approval,
            })
            .await?;

        info!(event_id = %event.id, club_id = %event.club_id, paid = event.is_paid(), "event created");
        Ok(event)
    }

    /// Edits price, capacity and approval. Runs under the event row lock so
    /// the checks see the same registrations the write does.
    pub async fn update_event_settings(
        &self,
        actor: &UserRow,
        club_id: Uuid,
        event_id: Uuid,
        change: SettingsChange,
    ) -> Result<EventRow, AppError> {
        require_organized_event(&self.state, actor.id, club_id, event_id).await?;

        let mut tx = self.state.db.begin().await?;
        let current = EventRepo::lock(&mut *tx, event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("event".to_string()))?;

        let price_cents = match change.price_cents {
            Some(requested) => normalize_price(requested)?,
            None => current.price_cents,
        };
        let max_capacity = match change.max_capacity {
            Some(requested) => validate_max_capacity(requested)?,
            None => current.max_capacity,
        };

        if price_cents != current.price_cents {
            let confirmed =
                RegistrationRepo::count_with_status(&mut *tx, event_id, RsvpStatus::Going).await?;
            let mut awaiting_payment = 0;
            for status in RsvpStatus::AWAITING_PAYMENT {
                awaiting_payment +=
                    RegistrationRepo::count_with_status(&mut *tx, event_id, status).await?;
            }
            check_price_change(current.price_cents, price_cents, confirmed, awaiting_payment)?;
        }
        if max_capacity != current.max_capacity {
            let reserved = capacity::count_reserved(&mut *tx, event_id).await?;
            capacity::check_capacity_reduction(reserved, max_capacity)?;
        }

        let settings = EventSettings {
            price_cents,
            max_capacity,
            requires_approval: change.requires_approval.unwrap_or(current.requires_approval),
        };
        let updated = EventRepo::update_settings(&mut *tx, event_id, &settings).await?;
        tx.commit().await?;

        info!(
            %event_id,
            actor_id = %actor.id,
            price_cents = ?updated.price_cents,
            max_capacity = ?updated.max_capacity,
            requires_approval = updated.requires_approval,
            "event settings updated"
        );
        Ok(updated)
    }
}
