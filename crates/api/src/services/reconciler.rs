//! Applies provider events to local state.
//!
//! Every handler is a conditional write, so replays and out-of-order
//! deliveries converge on the same rows. Events that cannot be correlated
//! are logged and acknowledged; only storage failures ask the provider to
//! retry.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use infra::models::RegistrationRow;
use infra::repos::{
    DeliveryRecord, EventRepo, MembershipRepo, MembershipStatus, PaymentConfirmation,
    RegistrationRepo, SubscriptionWrite, WebhookEventRepo,
};
use infra::rsvp::{transition, Action, RsvpStatus, TransitionError};

use super::{ChangeCause, RegistrationChange};
use crate::error::AppError;
use crate::payments::webhook::{
    unix_to_utc, verify_signature, Invoice, ProviderEvent, Subscription, WebhookEvent,
};
use crate::payments::{CheckoutMetadata, CheckoutSession};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Processed,
    /// Already applied on an earlier delivery.
    Duplicate,
}

/// Subscription states that keep a membership active.
pub fn membership_status_for(provider_status: &str) -> MembershipStatus {
    match provider_status {
        "active" | "trialing" => MembershipStatus::Active,
        _ => MembershipStatus::Inactive,
    }
}

fn event_rsvp_metadata(session: &CheckoutSession) -> Option<(uuid::Uuid, uuid::Uuid)> {
    match CheckoutMetadata::from_map(&session.metadata) {
        Ok(CheckoutMetadata::EventRsvp { event_id, user_id, .. }) => Some((event_id, user_id)),
        Ok(CheckoutMetadata::ClubMembership { .. }) => None,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "checkout session without usable metadata");
            None
        }
    }
}

pub struct Reconciler {
    state: AppState,
}

impl Reconciler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Entry point for `POST /webhooks/stripe`.
    pub async fn handle_delivery(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<DeliveryOutcome, AppError> {
        let config = &self.state.config;
        verify_signature(
            payload,
            signature,
            &config.stripe.webhook_secret,
            config.webhook_tolerance,
            Utc::now(),
        )
        .map_err(|e| {
            warn!(error = %e, "rejected webhook delivery");
            AppError::InvalidSignature
        })?;

        let event = ProviderEvent::parse(payload).map_err(|e| {
            warn!(error = %e, "unparseable webhook payload");
            AppError::BadRequest(e.to_string())
        })?;

        let deliveries = WebhookEventRepo::new(self.state.db.clone());
        if let DeliveryRecord::AlreadyProcessed(_) =
            deliveries.record(&event.id, &event.event_type, &event.raw).await?
        {
            info!(provider_event_id = %event.id, "webhook already processed");
            return Ok(DeliveryOutcome::Duplicate);
        }

        match self.dispatch(&event).await {
            Ok(()) => {
                deliveries.mark_processed(&event.id).await?;
                debug!(provider_event_id = %event.id, event_type = %event.event_type, "webhook processed");
                Ok(DeliveryOutcome::Processed)
            }
            Err(e) => {
                deliveries.mark_failed(&event.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Runs every handler that applies to the event. A failing handler does
    /// not stop the others; the delivery fails if any of them did.
    pub async fn dispatch(&self, event: &ProviderEvent) -> Result<(), AppError> {
        let at = event.created;
        let results: Vec<(&'static str, Result<(), AppError>)> = match &event.event {
            WebhookEvent::CheckoutCompleted(session) => vec![
                ("event_payment", self.apply_session_payment(session, at).await.map(drop)),
                ("membership_activation", self.activate_membership(session, at).await),
            ],
            WebhookEvent::CheckoutAsyncPaymentSucceeded(session) => vec![(
                "event_payment",
                self.apply_session_payment(session, at).await.map(drop),
            )],
            WebhookEvent::CheckoutAsyncPaymentFailed(session) | WebhookEvent::CheckoutExpired(session) => {
                vec![("event_payment_failure", self.apply_session_failure(session).await)]
            }
            WebhookEvent::SubscriptionUpdated(subscription) => vec![(
                "subscription_state",
                self.apply_subscription(subscription, membership_status_for(&subscription.status), at)
                    .await,
            )],
            WebhookEvent::SubscriptionDeleted(subscription) => vec![(
                "subscription_state",
                self.apply_subscription(subscription, MembershipStatus::Inactive, at).await,
            )],
            WebhookEvent::InvoicePaid(invoice) => vec![(
                "invoice",
                self.apply_invoice(invoice, MembershipStatus::Active, at).await,
            )],
            WebhookEvent::InvoicePaymentFailed(invoice) => vec![(
                "invoice",
                self.apply_invoice(invoice, MembershipStatus::Inactive, at).await,
            )],
            WebhookEvent::Unhandled(event_type) => {
                debug!(%event_type, "ignoring unhandled webhook type");
                Vec::new()
            }
        };

        let mut failures = Vec::new();
        for (handler, result) in results {
            if let Err(e) = result {
                error!(provider_event_id = %event.id, handler, error = %e, "webhook handler failed");
                failures.push(format!("{handler}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::Internal(failures.join("; ")))
        }
    }

    /// Confirms a paid seat. Shared by the webhook and the success redirect;
    /// whichever arrives second finds the row already `going` and does
    /// nothing.
    pub async fn apply_session_payment(
        &self,
        session: &CheckoutSession,
        at: DateTime<Utc>,
    ) -> Result<Option<RegistrationRow>, AppError> {
        let Some((event_id, user_id)) = event_rsvp_metadata(session) else {
            return Ok(None);
        };
        if !session.is_paid() {
            debug!(session_id = %session.id, status = ?session.payment_status, "session not paid yet");
            return Ok(None);
        }

        let Some(event) = EventRepo::new(self.state.db.clone()).get(event_id).await? else {
            warn!(%event_id, session_id = %session.id, "payment for unknown event");
            return Ok(None);
        };

        let mut tx = self.state.db.begin().await?;
        let current = RegistrationRepo::lock(&mut *tx, event_id, user_id).await?;
        let current_status = current.as_ref().map(|row| row.status()).transpose()?;

        let step = match transition(Action::PaymentSucceeded, current_status, event.policy()) {
            Ok(step) => step,
            Err(TransitionError::NotAwaitingPayment) => {
                warn!(
                    %event_id,
                    %user_id,
                    session_id = %session.id,
                    status = ?current_status,
                    "payment for a registration that is not awaiting payment"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if step.is_noop() {
            debug!(%event_id, %user_id, "payment already applied");
            return Ok(current);
        }

        let confirmation = PaymentConfirmation {
            amount_cents: session.amount_total,
            checkout_session_id: Some(session.id.clone()),
            payment_intent_id: session.payment_intent.clone(),
            paid_at: Some(at),
        };
        let updated = RegistrationRepo::mark_paid(&mut *tx, event_id, user_id, &confirmation).await?;
        tx.commit().await?;

        if let Some(row) = &updated {
            info!(%event_id, %user_id, amount = ?session.amount_total, "payment confirmed");
            self.state.publish_registration(RegistrationChange {
                event_id,
                user_id,
                status: RsvpStatus::Going,
                cause: ChangeCause::Provider,
            });
            debug!(paid_at = ?row.paid_at, "registration marked paid");
        }
        Ok(updated)
    }

    /// Failed or abandoned checkout: the seat is released.
    async fn apply_session_failure(&self, session: &CheckoutSession) -> Result<(), AppError> {
        let Some((event_id, user_id)) = event_rsvp_metadata(session) else {
            return Ok(());
        };
        let Some(event) = EventRepo::new(self.state.db.clone()).get(event_id).await? else {
            return Ok(());
        };

        let mut tx = self.state.db.begin().await?;
        let Some(current) = RegistrationRepo::lock(&mut *tx, event_id, user_id).await? else {
            warn!(%event_id, %user_id, "payment failure for missing registration");
            return Ok(());
        };

        // Only the session recorded on the row may fail it. A cleared id means
        // the registrant withdrew and re-entered after this session was opened.
        if current.checkout_session_id.as_deref() != Some(session.id.as_str()) {
            debug!(%event_id, %user_id, session_id = %session.id, "ignoring superseded session");
            return Ok(());
        }

        let step = match transition(Action::PaymentFailed, Some(current.status()?), event.policy()) {
            Ok(step) if !step.is_noop() => step,
            Ok(_) | Err(TransitionError::NotAwaitingPayment) => {
                debug!(%event_id, %user_id, status = %current.status, "payment failure not applicable");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if RegistrationRepo::mark_payment_failed(&mut *tx, event_id, user_id)
            .await?
            .is_some()
        {
            tx.commit().await?;
            info!(%event_id, %user_id, session_id = %session.id, "payment failed; seat released");
            self.state.publish_registration(RegistrationChange {
                event_id,
                user_id,
                status: step.to,
                cause: ChangeCause::Provider,
            });
        }
        Ok(())
    }

    async fn activate_membership(
        &self,
        session: &CheckoutSession,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (club_id, user_id) = match CheckoutMetadata::from_map(&session.metadata) {
            Ok(CheckoutMetadata::ClubMembership { club_id, user_id }) => (club_id, user_id),
            // Event sessions and uncorrelated sessions are handled (or
            // reported) by the payment handler.
            _ => return Ok(()),
        };
        if !session.is_paid() {
            debug!(session_id = %session.id, "membership checkout not paid yet");
            return Ok(());
        }

        let applied = MembershipRepo::new(self.state.db.clone())
            .activate_from_checkout(user_id, club_id, session.subscription.as_deref(), at)
            .await;

        match applied {
            Ok(Some(_)) => info!(%club_id, %user_id, "membership activated"),
            Ok(None) => debug!(%club_id, %user_id, "membership already updated by a newer event"),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                warn!(%club_id, %user_id, "membership checkout for unknown club or user");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn apply_subscription(
        &self,
        subscription: &Subscription,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let period_end = subscription.current_period_end.and_then(unix_to_utc);
        self.write_subscription_state(&subscription.id, status, period_end, at)
            .await
    }

    async fn apply_invoice(
        &self,
        invoice: &Invoice,
        status: MembershipStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            debug!(invoice_id = %invoice.id, "invoice without subscription");
            return Ok(());
        };
        let period_end = match status {
            MembershipStatus::Active => invoice.period_end.and_then(unix_to_utc),
            MembershipStatus::Inactive => None,
        };
        self.write_subscription_state(subscription_id, status, period_end, at)
            .await
    }

    async fn write_subscription_state(
        &self,
        subscription_id: &str,
        status: MembershipStatus,
        period_end: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let write = MembershipRepo::new(self.state.db.clone())
            .apply_subscription_state(subscription_id, status, period_end, at)
            .await?;

        match write {
            SubscriptionWrite::Applied(row) => {
                info!(%subscription_id, status = %row.status, club_id = %row.club_id, "membership updated")
            }
            SubscriptionWrite::Stale => {
                debug!(%subscription_id, "ignoring out-of-date subscription event")
            }
            SubscriptionWrite::Unknown => {
                warn!(%subscription_id, "subscription event for unknown membership")
            }
        }
        Ok(())
    }
}
