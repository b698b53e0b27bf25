pub mod audit;
pub mod clubs;
pub mod events;
pub mod memberships;
pub mod registrations;
pub mod users;
pub mod webhook_events;

pub use audit::{AuditRepo, NewAuditEntry};
pub use clubs::{ClubRepo, CreateClub};
pub use events::{CreateEvent, EventRepo, EventSettings};
pub use memberships::{MembershipRepo, MembershipStatus, SubscriptionWrite};
pub use registrations::{PaymentConfirmation, RegistrationRepo};
pub use users::UserRepo;
pub use webhook_events::{DeliveryRecord, WebhookEventRepo};
