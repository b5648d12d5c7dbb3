//! # Ratio Math Properties
//!
//! Randomised checks that the rebalancing arithmetic lands exactly where the
//! lending protocol will measure it.

use calida_math::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn required_delta_round_trips_to_target(
        collateral in 0u128..1_000_000_000_000_000_000_000_000_000_000,
        price in 1_000_000_000_000_000u128..10_000_000_000_000_000_000_000,
        extra_debt in 0u128..1_000_000_000_000_000_000_000_000_000_000,
        target in 1_000_000_000_000_000_000u128..5_000_000_000_000_000_000,
    ) {
        // Exactness holds whenever price <= debt
        let debt = price + extra_debt;

        let delta = required_delta(collateral, debt, price, target).unwrap();
        let adjusted = apply_delta(collateral, delta).unwrap();
        let ratio = current_ratio(adjusted, debt, price).unwrap();

        prop_assert_eq!(ratio, target);
    }

    #[test]
    fn adjusted_ratio_never_below_target(
        collateral in 0u128..1_000_000_000_000_000_000_000_000,
        price in 1_000_000_000_000_000u128..10_000_000_000_000_000_000_000,
        debt in 1u128..1_000_000_000_000_000_000_000_000,
        target in 1_000_000_000_000_000_000u128..5_000_000_000_000_000_000,
    ) {
        let delta = required_delta(collateral, debt, price, target).unwrap();
        let adjusted = apply_delta(collateral, delta).unwrap();
        let ratio = current_ratio(adjusted, debt, price).unwrap();

        prop_assert!(ratio >= target);
    }

    #[test]
    fn target_is_always_in_band(
        target in 0u128..10_000_000_000_000_000_000,
        deviation in 0u128..1_000_000_000_000_000_000,
    ) {
        prop_assert!(is_within_band(target, target, deviation));
    }

    #[test]
    fn nominal_ratio_orders_like_icr(
        coll_a in 1u128..1_000_000_000_000_000_000_000,
        coll_b in 1u128..1_000_000_000_000_000_000_000,
        debt in 1_000_000_000_000_000u128..1_000_000_000_000_000_000_000,
        price in 1_000_000_000_000_000u128..10_000_000_000_000_000_000_000,
    ) {
        // Same debt: more collateral never sorts lower under either key
        let (lo, hi) = if coll_a <= coll_b { (coll_a, coll_b) } else { (coll_b, coll_a) };
        prop_assert!(nominal_ratio(lo, debt).unwrap() <= nominal_ratio(hi, debt).unwrap());
        prop_assert!(current_ratio(lo, debt, price).unwrap() <= current_ratio(hi, debt, price).unwrap());
    }
}
