//! Property tests for hint resolution and share accounting

use calida_simulation::{SimulatedProtocol, SimulationConfig};
use calida_types::{CalidaError, HintPair, LendingProtocol, Pubkey, NICR_PRECISION};
use calida_vault::{is_valid_bracket, HintResolver, ShareLedger};
use proptest::prelude::*;

fn protocol_with(nicrs: &[u128]) -> (SimulatedProtocol, Vec<Pubkey>) {
    let sim = SimulatedProtocol::new(SimulationConfig::default());
    let debt = calida_types::DECIMAL_PRECISION;
    let ids = nicrs
        .iter()
        .map(|nicr| {
            // collateral = nicr * debt / 1e20, kept above the minimum ratio at price 1
            let collateral = calida_math::mul_div_floor(*nicr, debt, NICR_PRECISION).unwrap();
            sim.open_external_borrower(collateral, debt).unwrap()
        })
        .collect();
    (sim, ids)
}

proptest! {
    #[test]
    fn resolver_never_returns_an_invalid_bracket(
        nicrs in prop::collection::vec(2u128 * NICR_PRECISION..50 * NICR_PRECISION, 0..60),
        target in NICR_PRECISION..60 * NICR_PRECISION,
        probes in 0u32..20,
        max_steps in 0u32..80,
        seed in any::<u64>(),
    ) {
        let (sim, _) = protocol_with(&nicrs);
        let mut resolver = HintResolver::new(probes, max_steps);

        match resolver.resolve(&sim, &sim, target, None, Some(seed)) {
            Ok(hints) => prop_assert!(is_valid_bracket(&sim, target, &hints, None)),
            Err(err) => prop_assert_eq!(err, CalidaError::HintStale { max_steps }),
        }
    }

    #[test]
    fn repositioned_entry_gets_an_exact_bracket(
        nicrs in prop::collection::vec(2u128 * NICR_PRECISION..50 * NICR_PRECISION, 1..40),
        pick in any::<prop::sample::Index>(),
        target in 2u128 * NICR_PRECISION..60 * NICR_PRECISION,
        seed in any::<u64>(),
    ) {
        let (sim, ids) = protocol_with(&nicrs);
        let moving = ids[pick.index(ids.len())];
        let state = sim.position_state(&moving).unwrap();
        let collateral = calida_math::mul_div_ceil(target, state.debt, NICR_PRECISION).unwrap();
        let nicr = calida_math::nominal_ratio(collateral, state.debt).unwrap();

        // Enough steps to walk the whole list
        let mut resolver = HintResolver::new(5, 64);
        let hints = resolver.resolve(&sim, &sim, nicr, Some(&moving), Some(seed)).unwrap();
        prop_assert!(is_valid_bracket(&sim, nicr, &hints, Some(&moving)));
        prop_assert_ne!(hints.prev, Some(moving));
        prop_assert_ne!(hints.next, Some(moving));

        // The protocol takes the bracket as is, without searching
        let stale_before = sim.stale_hint_count();
        let delta = calida_math::signed_diff(collateral, state.collateral).unwrap();
        sim.adjust_collateral(&moving, delta, hints).unwrap();
        prop_assert_eq!(sim.stale_hint_count(), stale_before);
    }

    #[test]
    fn share_balances_always_sum_to_supply(
        ops in prop::collection::vec((0usize..4, any::<bool>(), 0u128..1_000), 0..100),
    ) {
        let holders: Vec<Pubkey> = (0..4).map(|_| Pubkey::new_unique()).collect();
        let mut ledger = ShareLedger::new();

        for (holder, is_mint, amount) in ops {
            let holder = &holders[holder];
            let before = ledger.clone();
            let result = if is_mint {
                ledger.mint(holder, amount)
            } else {
                ledger.burn(holder, amount)
            };
            if result.is_err() {
                prop_assert_eq!(&ledger, &before);
            }

            let sum: u128 = ledger.holders().iter().map(|(_, balance)| balance).sum();
            prop_assert_eq!(sum, ledger.total_supply());
        }
    }
}

#[test]
fn empty_hints_only_valid_on_empty_list() {
    let (sim, _) = protocol_with(&[3 * NICR_PRECISION]);
    assert!(!is_valid_bracket(&sim, NICR_PRECISION, &HintPair::empty(), None));

    let (empty, _) = protocol_with(&[]);
    assert!(is_valid_bracket(&empty, NICR_PRECISION, &HintPair::empty(), None));
}
