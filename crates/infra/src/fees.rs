/// Smallest amount the payment provider will charge, in minor units.
pub const MIN_CHARGE_CENTS: i64 = 50;

/// Platform share of a connected-account payment, in minor units.
///
/// Formula: `round(gross * fee_percent / 100)`, rounding half away from zero.
/// A non-positive gross or percentage yields no fee.
///
/// # Examples
///
/// ```
/// use infra::fees::platform_fee;
///
/// assert_eq!(platform_fee(2000, 5.0), 100);
/// assert_eq!(platform_fee(1999, 2.5), 50);
/// assert_eq!(platform_fee(1000, 0.0), 0);
/// ```
pub fn platform_fee(gross_cents: i64, fee_percent: f64) -> i64 {
    if gross_cents <= 0 || !(fee_percent > 0.0) {
        return 0;
    }
    let fee = (gross_cents as f64 * fee_percent / 100.0).round() as i64;
    fee.min(gross_cents)
}

/// What the organizer receives after the platform fee.
pub fn organizer_net(gross_cents: i64, fee_percent: f64) -> i64 {
    gross_cents - platform_fee(gross_cents, fee_percent)
}
