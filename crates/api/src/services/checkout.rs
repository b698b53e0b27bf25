//! Checkout sessions for paid events and paid club memberships.
//!
//! Provider calls never run inside a database transaction. Identifiers the
//! provider hands back are persisted with conditional writes so concurrent
//! first checkouts converge on one stored price.

use tracing::{info, warn};
use uuid::Uuid;

use infra::fees::{organizer_net, platform_fee};
use infra::models::{ClubRow, EventRow, MembershipRow, UserRow};
use infra::repos::{ClubRepo, EventRepo, MembershipRepo, MembershipStatus, RegistrationRepo, UserRepo};
use infra::rsvp::RsvpStatus;

use crate::error::{AppError, ConflictKind};
use crate::payments::{
    CheckoutMetadata, CheckoutMode, CheckoutRequest, FeeSplit, NewPrice, PlatformFee,
};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub enum MembershipCheckout {
    /// Free membership, active without a provider round trip.
    Activated(MembershipRow),
    Redirect(CheckoutLink),
}

pub struct CheckoutService {
    state: AppState,
}

impl CheckoutService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn success_url(&self) -> String {
        format!(
            "{}/payments/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.state.config.public_base_url
        )
    }

    /// Organizer who receives the money, checked for payment readiness.
    async fn payee(&self, club: &ClubRow) -> Result<UserRow, AppError> {
        let organizer = UserRepo::new(self.state.db.clone())
            .get_by_id(club.organizer_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("club {} has no organizer row", club.id)))?;

        if !organizer.payments_enabled {
            return Err(AppError::conflict(
                ConflictKind::PaymentNotConfigured,
                "the organizer has not enabled payments",
            ));
        }
        Ok(organizer)
    }

    /// Returns the event's provider price, creating product and price on
    /// first use.
    pub async fn ensure_event_price(&self, event: &EventRow) -> Result<String, AppError> {
        if let Some(price_id) = &event.provider_price_id {
            return Ok(price_id.clone());
        }
        let amount = event
            .price_cents
            .filter(|p| *p > 0)
            .ok_or_else(|| AppError::BadRequest("event is free".to_string()))?;

        let payments = self.state.payments();
        let product_id = match &event.provider_product_id {
            Some(id) => id.clone(),
            None => payments.create_product(&event.title).await?,
        };
        let price_id = payments
            .create_price(&NewPrice {
                product_id: product_id.clone(),
                unit_amount: amount,
                currency: self.state.config.currency.clone(),
                recurring_interval: None,
            })
            .await?;

        let stored = EventRepo::new(self.state.db.clone())
            .set_provider_ids(event.id, &product_id, &price_id)
            .await?
            .and_then(|row| row.provider_price_id)
            .ok_or_else(|| AppError::NotFound("event".to_string()))?;

        if stored != price_id {
            warn!(event_id = %event.id, orphan = %price_id, "concurrent price creation; using stored price");
        }
        Ok(stored)
    }

    /// Monthly recurring price for a club membership.
    pub async fn ensure_club_price(&self, club: &ClubRow) -> Result<String, AppError> {
        if let Some(price_id) = &club.provider_price_id {
            return Ok(price_id.clone());
        }
        let amount = club
            .membership_price_cents
            .filter(|p| *p > 0)
            .ok_or_else(|| AppError::BadRequest("membership is free".to_string()))?;

        let payments = self.state.payments();
        let product_id = match &club.provider_product_id {
            Some(id) => id.clone(),
            None => payments.create_product(&format!("{} membership", club.name)).await?,
        };
        let price_id = payments
            .create_price(&NewPrice {
                product_id: product_id.clone(),
                unit_amount: amount,
                currency: self.state.config.currency.clone(),
                recurring_interval: Some("month"),
            })
            .await?;

        ClubRepo::new(self.state.db.clone())
            .set_provider_ids(club.id, &product_id, &price_id)
            .await?
            .and_then(|row| row.provider_price_id)
            .ok_or_else(|| AppError::NotFound("club".to_string()))
    }

    /// Opens a checkout session for a seat the caller already holds at a paid
    /// event. Registration status is left alone; only the session id is
    /// recorded so a later failure can be matched to it.
    pub async fn create_event_checkout(
        &self,
        user: &UserRow,
        event_id: Uuid,
    ) -> Result<CheckoutLink, AppError> {
        let event = EventRepo::new(self.state.db.clone())
            .get(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("event".to_string()))?;
        if !event.is_paid() {
            return Err(AppError::BadRequest("event is free; no checkout needed".to_string()));
        }

        let registrations = RegistrationRepo::new(self.state.db.clone());
        let status = match registrations.get(event_id, user.id).await? {
            Some(row) => Some(row.status()?),
            None => None,
        };

        match status {
            Some(s) if s.is_awaiting_payment() => {}
            Some(RsvpStatus::Going) => {
                return Err(AppError::conflict(
                    ConflictKind::AlreadyConfirmed,
                    "registration is already confirmed",
                ))
            }
            Some(RsvpStatus::PendingApproval) => {
                return Err(AppError::conflict(
                    ConflictKind::AwaitingApproval,
                    "registration is waiting for organizer approval",
                ))
            }
            _ => {
                return Err(AppError::conflict(
                    ConflictKind::NoPendingPayment,
                    "registration has no pending payment; RSVP first",
                ))
            }
        }

        let club = ClubRepo::new(self.state.db.clone())
            .get(event.club_id)
            .await?
            .ok_or_else(|| AppError::NotFound("club".to_string()))?;
        let organizer = self.payee(&club).await?;
        let price_id = self.ensure_event_price(&event).await?;

        let gross = event.price_cents.unwrap_or_default();
        let fee_percent = self.state.config.platform_fee_percent;
        let split = organizer.provider_account_id.clone().map(|account| FeeSplit {
            destination_account: account,
            fee: PlatformFee::Amount(platform_fee(gross, fee_percent)),
        });

        let session = self
            .state
            .payments()
            .create_checkout_session(&CheckoutRequest {
                mode: CheckoutMode::Payment,
                price_id,
                success_url: self.success_url(),
                cancel_url: self.state.config.event_url(event_id),
                customer_email: user.email.clone(),
                metadata: CheckoutMetadata::EventRsvp {
                    event_id,
                    club_id: club.id,
                    user_id: user.id,
                },
                split,
            })
            .await?;
        let url = session.url.clone().ok_or_else(|| AppError::Provider("session without url".to_string()))?;

        let recorded = registrations
            .set_checkout_session(event_id, user.id, &session.id)
            .await?;
        if recorded.is_none() {
            // The registrant cancelled while the session was being created.
            return Err(AppError::conflict(
                ConflictKind::NoPendingPayment,
                "registration changed before checkout started",
            ));
        }

        info!(
            %event_id,
            user_id = %user.id,
            session_id = %session.id,
            gross,
            net = organizer_net(gross, fee_percent),
            "event checkout created"
        );

        Ok(CheckoutLink {
            url,
            session_id: session.id,
        })
    }

    /// Joins a club: free memberships activate at once, paid ones go through
    /// a subscription checkout and activate on the provider's confirmation.
    pub async fn create_membership_checkout(
        &self,
        user: &UserRow,
        club_id: Uuid,
    ) -> Result<MembershipCheckout, AppError> {
        let club = ClubRepo::new(self.state.db.clone())
            .get(club_id)
            .await?
            .ok_or_else(|| AppError::NotFound("club".to_string()))?;

        let memberships = MembershipRepo::new(self.state.db.clone());
        if let Some(existing) = memberships.get(user.id, club_id).await? {
            if existing.status == MembershipStatus::Active.as_str() {
                return Err(AppError::conflict(
                    ConflictKind::AlreadyConfirmed,
                    "membership is already active",
                ));
            }
        }

        if club.membership_price_cents.unwrap_or(0) <= 0 {
            let row = memberships.activate_free(user.id, club_id).await?;
            info!(%club_id, user_id = %user.id, "free membership activated");
            return Ok(MembershipCheckout::Activated(row));
        }

        let organizer = self.payee(&club).await?;
        let price_id = self.ensure_club_price(&club).await?;
        let split = organizer.provider_account_id.clone().map(|account| FeeSplit {
            destination_account: account,
            fee: PlatformFee::Percent(self.state.config.platform_fee_percent),
        });

        let session = self
            .state
            .payments()
            .create_checkout_session(&CheckoutRequest {
                mode: CheckoutMode::Subscription,
                price_id,
                success_url: self.success_url(),
                cancel_url: self.state.config.club_url(club_id),
                customer_email: user.email.clone(),
                metadata: CheckoutMetadata::ClubMembership {
                    club_id,
                    user_id: user.id,
                },
                split,
            })
            .await?;
        let url = session.url.clone().ok_or_else(|| AppError::Provider("session without url".to_string()))?;

        info!(%club_id, user_id = %user.id, session_id = %session.id, "membership checkout created");

        Ok(MembershipCheckout::Redirect(CheckoutLink {
            url,
            session_id: session.id,
        }))
    }
}
