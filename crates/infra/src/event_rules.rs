//! Configuration-time rules for events.
//!
//! These run when an organizer creates or edits an event, never at checkout.

use std::str::FromStr;

use chrono_tz::Tz;
use thiserror::Error;

use crate::fees::MIN_CHARGE_CENTS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventRuleError {
    #[error("price cannot be negative")]
    NegativePrice,
    #[error("price must be 0 or at least {min} cents")]
    BelowMinimumCharge { min: i64 },
    #[error("`{0}` is not a known IANA timezone")]
    UnknownTimezone(String),
    #[error("capacity must be a positive number of seats")]
    NonPositiveCapacity,
    #[error("price cannot change once a registration is confirmed")]
    PriceLocked,
    #[error("event cannot become free while registrations await payment")]
    PaymentsPending,
}

impl EventRuleError {
    /// Input field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            EventRuleError::NegativePrice
            | EventRuleError::BelowMinimumCharge { .. }
            | EventRuleError::PriceLocked
            | EventRuleError::PaymentsPending => "price",
            EventRuleError::UnknownTimezone(_) => "timezone",
            EventRuleError::NonPositiveCapacity => "maxCapacity",
        }
    }
}

/// Normalizes a price: `None` and `0` both mean free and are stored as `None`.
pub fn normalize_price(price_cents: Option<i64>) -> Result<Option<i64>, EventRuleError> {
    match price_cents {
        None | Some(0) => Ok(None),
        Some(p) if p < 0 => Err(EventRuleError::NegativePrice),
        Some(p) if p < MIN_CHARGE_CENTS => {
            Err(EventRuleError::BelowMinimumCharge { min: MIN_CHARGE_CENTS })
        }
        Some(p) => Ok(Some(p)),
    }
}

pub fn validate_timezone(tz: &str) -> Result<Tz, EventRuleError> {
    Tz::from_str(tz).map_err(|_| EventRuleError::UnknownTimezone(tz.to_string()))
}

pub fn validate_max_capacity(max_capacity: Option<i32>) -> Result<Option<i32>, EventRuleError> {
    match max_capacity {
        Some(n) if n <= 0 => Err(EventRuleError::NonPositiveCapacity),
        other => Ok(other),
    }
}

/// A confirmed attendee's cost is fixed: once anyone is `going`, the
/// normalized price may not move. A paid event also stays paid while anyone
/// holds a seat awaiting payment, since a free event has no checkout.
pub fn check_price_change(
    current: Option<i64>,
    requested: Option<i64>,
    confirmed_count: i64,
    awaiting_payment_count: i64,
) -> Result<(), EventRuleError> {
    if confirmed_count > 0 && current != requested {
        return Err(EventRuleError::PriceLocked);
    }
    if awaiting_payment_count > 0 && current.is_some() && requested.is_none() {
        return Err(EventRuleError::PaymentsPending);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_price() {
        assert_eq!(normalize_price(None), Ok(None));
        assert_eq!(normalize_price(Some(0)), Ok(None));
        assert_eq!(normalize_price(Some(50)), Ok(Some(50)));
        assert_eq!(normalize_price(Some(2500)), Ok(Some(2500)));
        assert_eq!(
            normalize_price(Some(49)),
            Err(EventRuleError::BelowMinimumCharge { min: 50 })
        );
        assert_eq!(normalize_price(Some(-1)), Err(EventRuleError::NegativePrice));
    }

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("Europe/Brussels").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert_eq!(
            validate_timezone("Mars/Olympus").unwrap_err().field(),
            "timezone"
        );
    }

    #[test]
    fn test_validate_max_capacity() {
        assert_eq!(validate_max_capacity(None), Ok(None));
        assert_eq!(validate_max_capacity(Some(1)), Ok(Some(1)));
        assert_eq!(validate_max_capacity(Some(0)), Err(EventRuleError::NonPositiveCapacity));
        assert_eq!(validate_max_capacity(Some(-3)), Err(EventRuleError::NonPositiveCapacity));
    }

    #[test]
    fn test_price_locked_after_confirmation() {
        assert_eq!(check_price_change(Some(1000), Some(1200), 0, 0), Ok(()));
        assert_eq!(check_price_change(Some(1000), Some(1000), 3, 0), Ok(()));
        assert_eq!(
            check_price_change(Some(1000), Some(1200), 1, 0),
            Err(EventRuleError::PriceLocked)
        );
        assert_eq!(check_price_change(None, Some(1200), 1, 0), Err(EventRuleError::PriceLocked));
    }

    #[test]
    fn test_paid_event_stays_paid_while_payments_pending() {
        assert_eq!(
            check_price_change(Some(1000), None, 0, 2),
            Err(EventRuleError::PaymentsPending)
        );
        assert_eq!(check_price_change(Some(1000), None, 0, 0), Ok(()));
        // Repricing keeps checkout available to the pending registrants.
        assert_eq!(check_price_change(Some(1000), Some(1500), 0, 2), Ok(()));
        assert_eq!(EventRuleError::PaymentsPending.field(), "price");
    }
}
