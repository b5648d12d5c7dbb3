/// Safe arithmetic operations with overflow protection
///
/// All operations return errors instead of panicking. Multiply-then-divide
/// goes through a 256-bit intermediate so that two 18-decimal values can be
/// multiplied without losing the high bits.

use calida_types::{CalidaError, CalidaResult};
use ethnum::U256;

// ============================================================================
// Safe Basic Arithmetic
// ============================================================================

/// Safe addition for u128 values
pub fn safe_add_u128(a: u128, b: u128) -> CalidaResult<u128> {
    a.checked_add(b)
        .ok_or_else(|| CalidaError::math_overflow("u128 addition", &[&a.to_string(), &b.to_string()]))
}

/// Safe subtraction for u128 values
pub fn safe_sub_u128(a: u128, b: u128) -> CalidaResult<u128> {
    a.checked_sub(b)
        .ok_or_else(|| CalidaError::math_underflow("u128 subtraction", &[&a.to_string(), &b.to_string()]))
}

/// Safe multiplication for u128 values
pub fn safe_mul_u128(a: u128, b: u128) -> CalidaResult<u128> {
    a.checked_mul(b)
        .ok_or_else(|| CalidaError::math_overflow("u128 multiplication", &[&a.to_string(), &b.to_string()]))
}

/// Safe division for u128 values
pub fn safe_div_u128(a: u128, b: u128) -> CalidaResult<u128> {
    if b == 0 {
        return Err(CalidaError::division_by_zero(&format!("u128 division: {} / {}", a, b)));
    }
    Ok(a / b)
}

// ============================================================================
// Widened Multiply-Divide
// ============================================================================

/// `a * b / denominator`, rounded down
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> CalidaResult<u128> {
    mul_div(a, b, denominator, false)
}

/// `a * b / denominator`, rounded up
pub fn mul_div_ceil(a: u128, b: u128, denominator: u128) -> CalidaResult<u128> {
    mul_div(a, b, denominator, true)
}

fn mul_div(a: u128, b: u128, denominator: u128, round_up: bool) -> CalidaResult<u128> {
    if denominator == 0 {
        return Err(CalidaError::division_by_zero(&format!(
            "mul_div: {} * {} / {}",
            a, b, denominator
        )));
    }

    // Product of two u128 values always fits in 256 bits
    let numerator = U256::new(a) * U256::new(b);
    let denominator_wide = U256::new(denominator);
    let mut result = numerator / denominator_wide;

    if round_up && numerator % denominator_wide != U256::ZERO {
        result += U256::ONE;
    }

    if result > U256::new(u128::MAX) {
        return Err(CalidaError::math_overflow(
            "mul_div",
            &[&a.to_string(), &b.to_string(), &denominator.to_string()],
        ));
    }

    Ok(result.as_u128())
}

// ============================================================================
// Signed Conversions
// ============================================================================

/// Convert an unsigned amount to a signed delta
pub fn to_signed(value: u128) -> CalidaResult<i128> {
    i128::try_from(value)
        .map_err(|_| CalidaError::math_overflow("signed conversion", &[&value.to_string()]))
}

/// Signed difference `a - b` between two unsigned amounts
pub fn signed_diff(a: u128, b: u128) -> CalidaResult<i128> {
    if a >= b {
        to_signed(a - b)
    } else {
        Ok(-to_signed(b - a)?)
    }
}

/// Apply a signed delta to an unsigned amount
pub fn apply_delta(value: u128, delta: i128) -> CalidaResult<u128> {
    if delta >= 0 {
        safe_add_u128(value, delta.unsigned_abs())
    } else {
        safe_sub_u128(value, delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_arithmetic() {
        // Normal operations should work
        assert_eq!(safe_add_u128(100, 200).unwrap(), 300);
        assert_eq!(safe_sub_u128(200, 100).unwrap(), 100);
        assert_eq!(safe_mul_u128(10, 20).unwrap(), 200);
        assert_eq!(safe_div_u128(100, 5).unwrap(), 20);

        // Overflow cases should error
        assert!(safe_add_u128(u128::MAX, 1).is_err());
        assert!(safe_sub_u128(100, 200).is_err());
        assert!(safe_div_u128(100, 0).is_err());
    }

    #[test]
    fn test_mul_div_uses_wide_intermediate() {
        // u128::MAX * 2 / 4 overflows u128 in the product but not in the result
        assert_eq!(mul_div_floor(u128::MAX, 2, 4).unwrap(), u128::MAX / 2);

        // Result that does not fit u128 is reported, not truncated
        assert!(matches!(
            mul_div_floor(u128::MAX, 2, 1),
            Err(CalidaError::MathOverflow { .. })
        ));
    }

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div_floor(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_ceil(9, 1, 3).unwrap(), 3);
        assert!(matches!(
            mul_div_ceil(1, 1, 0),
            Err(CalidaError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_signed_helpers() {
        assert_eq!(signed_diff(10, 4).unwrap(), 6);
        assert_eq!(signed_diff(4, 10).unwrap(), -6);
        assert!(to_signed(u128::MAX).is_err());

        assert_eq!(apply_delta(10, -4).unwrap(), 6);
        assert_eq!(apply_delta(10, 5).unwrap(), 15);
        assert!(apply_delta(3, -4).is_err());
    }
}
