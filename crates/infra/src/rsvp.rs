//! Registration status machine.
//!
//! `transition` is the single place that decides which status a registration
//! moves to. Callers read the current row under a lock, ask for the
//! transition, and persist `to` with a write conditioned on `from`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    NotGoing,
    Going,
    PendingPayment,
    PendingApproval,
    ApprovedPendingPayment,
    Rejected,
    PaymentFailed,
}

impl RsvpStatus {
    /// Statuses that hold a seat against the event's capacity.
    pub const RESERVED: [RsvpStatus; 4] = [
        RsvpStatus::Going,
        RsvpStatus::PendingPayment,
        RsvpStatus::ApprovedPendingPayment,
        RsvpStatus::PendingApproval,
    ];

    /// Statuses a provider payment confirmation may complete.
    pub const AWAITING_PAYMENT: [RsvpStatus; 2] =
        [RsvpStatus::PendingPayment, RsvpStatus::ApprovedPendingPayment];

    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::NotGoing => "not_going",
            RsvpStatus::Going => "going",
            RsvpStatus::PendingPayment => "pending_payment",
            RsvpStatus::PendingApproval => "pending_approval",
            RsvpStatus::ApprovedPendingPayment => "approved_pending_payment",
            RsvpStatus::Rejected => "rejected",
            RsvpStatus::PaymentFailed => "payment_failed",
        }
    }

    pub fn is_reserved(&self) -> bool {
        Self::RESERVED.contains(self)
    }

    pub fn is_awaiting_payment(&self) -> bool {
        Self::AWAITING_PAYMENT.contains(self)
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown registration status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for RsvpStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_going" => Ok(RsvpStatus::NotGoing),
            "going" => Ok(RsvpStatus::Going),
            "pending_payment" => Ok(RsvpStatus::PendingPayment),
            "pending_approval" => Ok(RsvpStatus::PendingApproval),
            "approved_pending_payment" => Ok(RsvpStatus::ApprovedPendingPayment),
            "rejected" => Ok(RsvpStatus::Rejected),
            "payment_failed" => Ok(RsvpStatus::PaymentFailed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The two event settings that decide which transitions are reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPolicy {
    pub paid: bool,
    pub requires_approval: bool,
}

impl EventPolicy {
    pub fn new(price_cents: Option<i64>, requires_approval: bool) -> Self {
        Self {
            paid: price_cents.unwrap_or(0) > 0,
            requires_approval,
        }
    }

    /// Where a fresh request to attend lands.
    pub fn entry_status(&self) -> RsvpStatus {
        match (self.requires_approval, self.paid) {
            (true, _) => RsvpStatus::PendingApproval,
            (false, true) => RsvpStatus::PendingPayment,
            (false, false) => RsvpStatus::Going,
        }
    }

    /// Where an approved request lands.
    pub fn approved_status(&self) -> RsvpStatus {
        if self.paid {
            RsvpStatus::ApprovedPendingPayment
        } else {
            RsvpStatus::Going
        }
    }
}

/// What the registrant may ask for. Every other status is reached through an
/// organizer decision or a provider callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTarget {
    Going,
    NotGoing,
}

impl TryFrom<RsvpStatus> for UserTarget {
    type Error = TransitionError;

    fn try_from(status: RsvpStatus) -> Result<Self, Self::Error> {
        match status {
            RsvpStatus::Going => Ok(UserTarget::Going),
            RsvpStatus::NotGoing => Ok(UserTarget::NotGoing),
            other => Err(TransitionError::InvalidTarget(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Request(UserTarget),
    Approve,
    Reject,
    PaymentSucceeded,
    PaymentFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<RsvpStatus>,
    pub to: RsvpStatus,
    /// The caller did not hold a seat before and will hold one after, so the
    /// write must be gated on the capacity ledger.
    pub needs_seat: bool,
}

impl Transition {
    fn new(from: Option<RsvpStatus>, to: RsvpStatus) -> Self {
        let held = from.is_some_and(|s| s.is_reserved());
        Self {
            from,
            to,
            needs_seat: !held && to.is_reserved(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == Some(self.to)
    }

    /// The registrant has to go through checkout before the seat is confirmed.
    pub fn requires_payment(&self) -> bool {
        self.to.is_awaiting_payment()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("status `{0}` cannot be requested directly")]
    InvalidTarget(RsvpStatus),
    #[error("registration not found or already processed")]
    NotPendingApproval,
    #[error("registration is not awaiting payment")]
    NotAwaitingPayment,
}

pub fn transition(
    action: Action,
    current: Option<RsvpStatus>,
    policy: EventPolicy,
) -> Result<Transition, TransitionError> {
    use RsvpStatus::*;

    let to = match (action, current) {
        (Action::Request(UserTarget::Going), None) => policy.entry_status(),
        (Action::Request(UserTarget::Going), Some(NotGoing | Rejected | PaymentFailed)) => {
            policy.entry_status()
        }
        // Holders keep what they have; an approved registrant is not sent
        // back to the approval queue.
        (Action::Request(UserTarget::Going), Some(held)) => held,
        // A rejection stands until the registrant asks to go again.
        (Action::Request(UserTarget::NotGoing), Some(Rejected)) => Rejected,
        (Action::Request(UserTarget::NotGoing), _) => NotGoing,

        (Action::Approve, Some(PendingApproval)) => policy.approved_status(),
        (Action::Reject, Some(PendingApproval)) => Rejected,
        (Action::Approve | Action::Reject, _) => return Err(TransitionError::NotPendingApproval),

        (Action::PaymentSucceeded, Some(PendingPayment | ApprovedPendingPayment | Going)) => Going,
        (Action::PaymentFailed, Some(PendingPayment | PaymentFailed)) => PaymentFailed,
        (Action::PaymentSucceeded | Action::PaymentFailed, _) => {
            return Err(TransitionError::NotAwaitingPayment)
        }
    };

    Ok(Transition::new(current, to))
}
