//! Transactional orchestration. Services own the database transactions and
//! provider calls; resolvers and routes stay thin.

pub mod approvals;
pub mod checkout;
pub mod clubs;
pub mod events;
pub mod reconciler;
pub mod rsvp;

use uuid::Uuid;

use infra::rsvp::RsvpStatus;

pub use approvals::{ApprovalService, BulkOutcome, Decision, DecisionOutcome};
pub use checkout::{CheckoutLink, CheckoutService, MembershipCheckout};
pub use clubs::{CleanupOutcome, ClubService};
pub use events::{EventService, NewEvent, SettingsChange};
pub use reconciler::{DeliveryOutcome, Reconciler};
pub use rsvp::{RsvpOutcome, RsvpService};

/// Who moved a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Registrant,
    Organizer,
    Provider,
}

/// Published after every committed registration change.
#[derive(Debug, Clone)]
pub struct RegistrationChange {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: RsvpStatus,
    pub cause: ChangeCause,
}
