//! Conversion between wire amounts (f64 currency units) and stored minor units.
//!
//! Every amount is rounded to cents exactly once, at the boundary. Totals,
//! comparisons and balance checks all run on `i64` minor units.

/// Largest magnitude accepted on the wire, in minor units.
///
/// Whole cents above 2^53 are no longer exact in an f64, so anything past
/// this bound would be rounded silently before it reaches the ledger.
pub const MAX_MINOR: i64 = 1 << 53;

/// Currency units to minor units, rounding half away from zero.
///
/// `None` for NaN, infinities and amounts whose magnitude exceeds
/// [`MAX_MINOR`].
pub fn to_minor(amount: f64) -> Option<i64> {
    if !amount.is_finite() {
        return None;
    }
    let minor = (amount * 100.0).round();
    if minor.abs() > MAX_MINOR as f64 {
        return None;
    }
    Some(minor as i64)
}

/// Sum of minor-unit amounts, `None` on overflow.
pub fn checked_total<I>(amounts: I) -> Option<i64>
where
    I: IntoIterator<Item = i64>,
{
    amounts
        .into_iter()
        .try_fold(0i64, |total, amount| total.checked_add(amount))
}

/// Minor units back to currency units for responses.
pub fn from_minor(minor: i64) -> f64 {
    minor as f64 / 100.0
}

/// ISO 4217 shape: exactly three uppercase ASCII letters.
pub fn is_valid_currency(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}
