use async_graphql::{ComplexObject, Context, Enum, InputObject, MaybeUndefined, Result, SimpleObject, ID};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use infra::capacity::{self, CapacitySnapshot};
use infra::models::{AuditRow, ClubRow, EventRow, MembershipRow, RegistrationRow};
use infra::rsvp::RsvpStatus as DomainStatus;

use crate::error::AppError;
use crate::gql::scalars::Money;
use crate::services::{
    BulkOutcome, ChangeCause, CheckoutLink, CleanupOutcome, DecisionOutcome, RegistrationChange,
    RsvpOutcome,
};
use crate::state::AppState;

pub fn parse_id(id: &ID, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(id.as_str())
        .map_err(|_| async_graphql::ErrorExtensions::extend(&AppError::validation(field, "not a valid id")))
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum RsvpStatus {
    NotGoing,
    Going,
    PendingPayment,
    PendingApproval,
    ApprovedPendingPayment,
    Rejected,
    PaymentFailed,
}

impl From<DomainStatus> for RsvpStatus {
    fn from(s: DomainStatus) -> Self {
        match s {
            DomainStatus::NotGoing => RsvpStatus::NotGoing,
            DomainStatus::Going => RsvpStatus::Going,
            DomainStatus::PendingPayment => RsvpStatus::PendingPayment,
            DomainStatus::PendingApproval => RsvpStatus::PendingApproval,
            DomainStatus::ApprovedPendingPayment => RsvpStatus::ApprovedPendingPayment,
            DomainStatus::Rejected => RsvpStatus::Rejected,
            DomainStatus::PaymentFailed => RsvpStatus::PaymentFailed,
        }
    }
}

impl From<RsvpStatus> for DomainStatus {
    fn from(s: RsvpStatus) -> Self {
        match s {
            RsvpStatus::NotGoing => DomainStatus::NotGoing,
            RsvpStatus::Going => DomainStatus::Going,
            RsvpStatus::PendingPayment => DomainStatus::PendingPayment,
            RsvpStatus::PendingApproval => DomainStatus::PendingApproval,
            RsvpStatus::ApprovedPendingPayment => DomainStatus::ApprovedPendingPayment,
            RsvpStatus::Rejected => DomainStatus::Rejected,
            RsvpStatus::PaymentFailed => DomainStatus::PaymentFailed,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Registration {
    pub event_id: ID,
    pub user_id: ID,
    pub status: RsvpStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = AppError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status()?.into(),
            event_id: row.event_id.into(),
            user_id: row.user_id.into(),
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
            rejection_reason: row.rejection_reason,
            paid_at: row.paid_at,
            paid_amount: row.paid_amount_cents.map(Money),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Converts a batch of rows, failing on the first unknown status.
pub fn registrations(rows: Vec<RegistrationRow>) -> Result<Vec<Registration>> {
    rows.into_iter()
        .map(|row| Registration::try_from(row).map_err(|e| async_graphql::ErrorExtensions::extend(&e)))
        .collect()
}

#[derive(SimpleObject, Clone)]
pub struct Club {
    pub id: ID,
    pub name: String,
    /// Monthly fee; absent for free membership.
    pub membership_price: Option<Money>,
}

impl From<ClubRow> for Club {
    fn from(row: ClubRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            membership_price: row.membership_price_cents.filter(|p| *p > 0).map(Money),
        }
    }
}

#[derive(SimpleObject, Clone)]
#[graphql(complex)]
pub struct Event {
    pub id: ID,
    pub club_id: ID,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub timezone: String,
    /// Absent for free events.
    pub price: Option<Money>,
    pub max_capacity: Option<i32>,
    pub requires_approval: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id.into(),
            club_id: row.club_id.into(),
            title: row.title,
            start_time: row.start_time,
            timezone: row.timezone,
            price: row.price_cents.map(Money),
            max_capacity: row.max_capacity,
            requires_approval: row.requires_approval,
        }
    }
}

#[ComplexObject]
impl Event {
    /// Seats currently held. Display only; admission is decided at write time.
    async fn capacity(&self, ctx: &Context<'_>) -> Result<CapacityInfo> {
        let state = ctx.data::<AppState>()?;
        let event_id = parse_id(&self.id, "id")?;
        let snapshot = capacity::snapshot(&state.db, event_id, self.max_capacity)
            .await
            .map_err(|e| async_graphql::ErrorExtensions::extend(&AppError::from(e)))?;
        Ok(snapshot.into())
    }
}

#[derive(SimpleObject, Clone)]
pub struct CapacityInfo {
    pub reserved: i64,
    pub max_capacity: Option<i32>,
    /// `None` when the event is unlimited.
    pub available: Option<i64>,
    pub is_full: bool,
}

impl From<CapacitySnapshot> for CapacityInfo {
    fn from(s: CapacitySnapshot) -> Self {
        Self {
            reserved: s.reserved,
            max_capacity: s.max_capacity,
            available: s.available,
            is_full: !capacity::has_capacity(s.reserved, s.max_capacity),
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Membership {
    pub club_id: ID,
    pub user_id: ID,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            club_id: row.club_id.into(),
            user_id: row.user_id.into(),
            status: row.status,
            current_period_end: row.current_period_end,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct AuditEntry {
    pub id: ID,
    pub actor_id: ID,
    pub subject_user_id: Option<ID>,
    pub action: String,
    pub detail: async_graphql::Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id.into(),
            actor_id: row.actor_id.into(),
            subject_user_id: row.subject_user_id.map(Into::into),
            action: row.action,
            detail: async_graphql::Json(row.detail),
            created_at: row.created_at,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct RsvpPayload {
    pub registration: Registration,
    pub requires_payment: bool,
}

impl TryFrom<RsvpOutcome> for RsvpPayload {
    type Error = AppError;

    fn try_from(outcome: RsvpOutcome) -> Result<Self, Self::Error> {
        Ok(Self {
            registration: outcome.registration.try_into()?,
            requires_payment: outcome.requires_payment,
        })
    }
}

#[derive(SimpleObject, Clone)]
pub struct CheckoutPayload {
    pub url: String,
    pub session_id: String,
}

impl From<CheckoutLink> for CheckoutPayload {
    fn from(link: CheckoutLink) -> Self {
        Self {
            url: link.url,
            session_id: link.session_id,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct DecisionPayload {
    pub registration: Registration,
    pub message: String,
}

impl TryFrom<DecisionOutcome> for DecisionPayload {
    type Error = AppError;

    fn try_from(outcome: DecisionOutcome) -> Result<Self, Self::Error> {
        Ok(Self {
            registration: outcome.registration.try_into()?,
            message: outcome.message,
        })
    }
}

#[derive(SimpleObject, Clone)]
pub struct BulkDecisionPayload {
    pub updated: Vec<Registration>,
    pub skipped_user_ids: Vec<ID>,
}

impl TryFrom<BulkOutcome> for BulkDecisionPayload {
    type Error = AppError;

    fn try_from(outcome: BulkOutcome) -> Result<Self, Self::Error> {
        Ok(Self {
            updated: outcome
                .updated
                .into_iter()
                .map(Registration::try_from)
                .collect::<Result<_, _>>()?,
            skipped_user_ids: outcome.skipped.into_iter().map(Into::into).collect(),
        })
    }
}

/// Either the membership is already active (free club) or the caller must
/// complete checkout.
#[derive(SimpleObject, Clone)]
pub struct MembershipCheckoutPayload {
    pub membership: Option<Membership>,
    pub checkout: Option<CheckoutPayload>,
}

#[derive(SimpleObject, Clone)]
pub struct CleanupPayload {
    pub deleted: bool,
    pub warnings: Vec<String>,
}

impl From<CleanupOutcome> for CleanupPayload {
    fn from(outcome: CleanupOutcome) -> Self {
        Self {
            deleted: outcome.deleted,
            warnings: outcome.warnings,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum UpdateSource {
    Registrant,
    Organizer,
    PaymentProvider,
}

#[derive(SimpleObject, Clone)]
pub struct RegistrationUpdate {
    pub event_id: ID,
    pub user_id: ID,
    pub status: RsvpStatus,
    pub source: UpdateSource,
}

impl From<RegistrationChange> for RegistrationUpdate {
    fn from(change: RegistrationChange) -> Self {
        Self {
            event_id: change.event_id.into(),
            user_id: change.user_id.into(),
            status: change.status.into(),
            source: match change.cause {
                ChangeCause::Registrant => UpdateSource::Registrant,
                ChangeCause::Organizer => UpdateSource::Organizer,
                ChangeCause::Provider => UpdateSource::PaymentProvider,
            },
        }
    }
}

#[derive(InputObject)]
pub struct SetRsvpInput {
    pub event_id: ID,
    /// `GOING` or `NOT_GOING`.
    pub status: RsvpStatus,
}

#[derive(InputObject)]
pub struct CreateEventInput {
    pub club_id: ID,
    pub title: String,
    pub start_time: DateTime<Utc>,
    /// IANA name, e.g. `Europe/Brussels`.
    pub timezone: String,
    pub price: Option<Money>,
    pub max_capacity: Option<i32>,
    #[graphql(default)]
    pub requires_approval: bool,
}

/// Omitted fields are left unchanged; `null` clears price or capacity.
#[derive(InputObject)]
pub struct UpdateEventSettingsInput {
    pub club_id: ID,
    pub event_id: ID,
    #[graphql(default)]
    pub price: MaybeUndefined<Money>,
    #[graphql(default)]
    pub max_capacity: MaybeUndefined<i32>,
    pub requires_approval: Option<bool>,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DecisionAction {
    Approve,
    Reject,
}

#[derive(InputObject)]
pub struct DecideRegistrationsInput {
    pub club_id: ID,
    pub event_id: ID,
    pub user_ids: Vec<ID>,
    pub action: DecisionAction,
    pub reason: Option<String>,
}

pub fn maybe<T, U>(value: MaybeUndefined<T>, f: impl FnOnce(T) -> U) -> Option<Option<U>> {
    match value {
        MaybeUndefined::Undefined => None,
        MaybeUndefined::Null => Some(None),
        MaybeUndefined::Value(v) => Some(Some(f(v))),
    }
}
