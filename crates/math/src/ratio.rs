//! Collateral ratio arithmetic.
//!
//! Formulas and rounding follow the lending protocol's own accounting so that
//! a ratio computed here equals the one the protocol uses to sort and
//! liquidate positions:
//!
//! - ICR  = collateral * price / debt            (18 decimals)
//! - NICR = collateral * 1e20 / debt             (price independent list key)
//!
//! A position without debt has no defined ratio here; callers get
//! `DivisionByZero` rather than an "infinite" sentinel.

use calida_types::{CalidaError, CalidaResult, NICR_PRECISION};

use crate::safe::*;

/// Individual collateral ratio of a position at `price`
pub fn current_ratio(collateral: u128, debt: u128, price: u128) -> CalidaResult<u128> {
    if debt == 0 {
        return Err(CalidaError::division_by_zero("collateral ratio of a debt-free position"));
    }
    mul_div_floor(collateral, price, debt)
}

/// Nominal ratio the protocol's ordered list is keyed by
pub fn nominal_ratio(collateral: u128, debt: u128) -> CalidaResult<u128> {
    if debt == 0 {
        return Err(CalidaError::division_by_zero("nominal ratio of a debt-free position"));
    }
    mul_div_floor(collateral, NICR_PRECISION, debt)
}

/// Lower and upper edge of the target band, both inclusive
pub fn band_bounds(target: u128, deviation: u128) -> (u128, u128) {
    (target.saturating_sub(deviation), target.saturating_add(deviation))
}

/// `target - deviation <= ratio <= target + deviation`
pub fn is_within_band(ratio: u128, target: u128, deviation: u128) -> bool {
    let (lower, upper) = band_bounds(target, deviation);
    ratio >= lower && ratio <= upper
}

/// Signed collateral change that brings the ratio back to `target`.
///
/// Solves `(collateral + delta) * price / debt = target`. The collateral
/// needed is rounded up, so after applying the delta the ratio is at or just
/// above target, never below it.
pub fn required_delta(collateral: u128, debt: u128, price: u128, target: u128) -> CalidaResult<i128> {
    if debt == 0 {
        return Err(CalidaError::division_by_zero("required delta of a debt-free position"));
    }
    if price == 0 {
        return Err(CalidaError::division_by_zero("required delta at zero price"));
    }

    let needed = mul_div_ceil(target, debt, price)?;
    signed_diff(needed, collateral)
}

/// Debt that opens a position with `collateral` exactly at `target`.
///
/// Rounded down, so the opening ratio is at or just above target.
pub fn debt_for_ratio(collateral: u128, price: u128, target: u128) -> CalidaResult<u128> {
    if target == 0 {
        return Err(CalidaError::division_by_zero("debt for a zero target ratio"));
    }
    mul_div_floor(collateral, price, target)
}

/// Debt to draw alongside `added` collateral so the ratio stays where it is.
///
/// Rounded down, so the ratio can only move up by rounding.
pub fn proportional_debt(added: u128, collateral: u128, debt: u128) -> CalidaResult<u128> {
    if collateral == 0 {
        return Err(CalidaError::division_by_zero("proportional debt of an empty position"));
    }
    mul_div_floor(added, debt, collateral)
}
