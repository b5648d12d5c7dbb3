/// Decimal fixed-point conversions (18 fractional digits)

use calida_types::{CalidaError, CalidaResult, DECIMALS, DECIMAL_PRECISION};

use crate::safe::*;

// ============================================================================
// Fixed-Point Conversion Functions
// ============================================================================

/// Convert a whole number of units to fixed point
pub fn units_to_decimal(units: u64) -> u128 {
    (units as u128) * DECIMAL_PRECISION
}

/// Parse a decimal string such as `"1.2"` or `"0.05"` into fixed point.
///
/// At most 18 fractional digits are accepted; no rounding is applied.
pub fn parse_decimal(input: &str) -> CalidaResult<u128> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CalidaError::invalid_parameter("decimal", input, "a non-empty decimal number"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if fraction.len() > DECIMALS as usize {
        return Err(CalidaError::invalid_parameter(
            "decimal",
            input,
            "at most 18 fractional digits",
        ));
    }

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
        return Err(CalidaError::invalid_parameter("decimal", input, "digits with an optional '.'"));
    }

    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| CalidaError::math_overflow("parse decimal", &[input]))?
    };

    let fraction_value: u128 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = DECIMALS as usize);
        padded
            .parse()
            .map_err(|_| CalidaError::invalid_parameter("decimal", input, "a valid fraction"))?
    };

    safe_add_u128(safe_mul_u128(whole_value, DECIMAL_PRECISION)?, fraction_value)
}

/// Render a fixed-point value as a decimal string, trimming trailing zeros
pub fn format_decimal(value: u128) -> String {
    let whole = value / DECIMAL_PRECISION;
    let fraction = value % DECIMAL_PRECISION;
    if fraction == 0 {
        return whole.to_string();
    }

    let digits = format!("{:0>width$}", fraction, width = DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Convert fixed point to f64, for logging only
pub fn decimal_to_f64(value: u128) -> f64 {
    (value as f64) / (DECIMAL_PRECISION as f64)
}

// ============================================================================
// Fixed-Point Arithmetic Operations
// ============================================================================

/// Multiply two fixed-point numbers, rounding down
pub fn mul_decimal(a: u128, b: u128) -> CalidaResult<u128> {
    mul_div_floor(a, b, DECIMAL_PRECISION)
}

/// Divide two fixed-point numbers, rounding down
pub fn div_decimal(a: u128, b: u128) -> CalidaResult<u128> {
    mul_div_floor(a, DECIMAL_PRECISION, b)
}
