use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use calida_math::{apply_delta, current_ratio, nominal_ratio};
use calida_types::{
    CalidaError, CalidaResult, ExternalPositionStatus, HintHelper, HintPair, LendingProtocol,
    PositionState, PriceFeed, Pubkey, SortedPositions, DECIMAL_PRECISION, MIN_COLLATERAL_RATIO,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sorted_list::SortedList;

/// Parameters of a simulated lending market
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Initial collateral price, 18 decimals
    pub initial_price: u128,
    /// Minimum collateral ratio enforced on open and adjust
    pub min_collateral_ratio: u128,
    /// Asset the price feed quotes
    pub collateral_asset: Pubkey,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_price: DECIMAL_PRECISION,
            min_collateral_ratio: MIN_COLLATERAL_RATIO,
            collateral_asset: Pubkey::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SimPosition {
    collateral: u128,
    debt: u128,
    status: ExternalPositionStatus,
}

#[derive(Debug, Default)]
struct SimState {
    price: u128,
    positions: HashMap<Pubkey, SimPosition>,
    list: SortedList,
    /// Inserts whose hint had to be replaced by a full search
    stale_hints: u64,
    /// Mutating calls accepted
    mutations: u64,
    /// Error returned by the next mutating call, if armed
    fail_next: Option<String>,
}

/// In-memory lending protocol implementing every collaborator interface
#[derive(Debug)]
pub struct SimulatedProtocol {
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl SimulatedProtocol {
    pub fn new(config: SimulationConfig) -> Self {
        let state = SimState {
            price: config.initial_price,
            ..SimState::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // ========================================================================
    // Market Controls
    // ========================================================================

    pub fn set_price(&self, price: u128) {
        log::debug!("Simulated price set to {}", price);
        self.state().price = price;
    }

    pub fn price(&self) -> u128 {
        self.state().price
    }

    /// Open a position for a borrower outside the vault
    pub fn open_external_borrower(&self, collateral: u128, debt: u128) -> CalidaResult<Pubkey> {
        let owner = Pubkey::new_unique();
        self.open_position(&owner, collateral, debt, HintPair::empty())?;
        Ok(owner)
    }

    /// Populate the list with `count` borrowers at random ratios from the
    /// minimum ratio up to four times the minimum
    pub fn populate_borrowers(&self, count: usize, seed: u64) -> CalidaResult<Vec<Pubkey>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let price = self.price();
        let min_ratio = self.config.min_collateral_ratio;
        let mut owners = Vec::with_capacity(count);

        for _ in 0..count {
            let debt = rng.gen_range(1_000u128..100_000) * DECIMAL_PRECISION;
            let ratio = rng.gen_range(min_ratio..min_ratio * 4);
            let collateral = calida_math::mul_div_ceil(ratio, debt, price)?;
            owners.push(self.open_external_borrower(collateral, debt)?);
        }

        Ok(owners)
    }

    /// Close a position the way its owner or a liquidator would
    pub fn close_position(&self, position: &Pubkey, status: ExternalPositionStatus) -> CalidaResult<()> {
        let mut state = self.state();
        let entry = state
            .positions
            .get_mut(position)
            .ok_or(CalidaError::PositionNotFound { position: *position })?;
        entry.status = status;
        state.list.remove(position);
        Ok(())
    }

    /// Make the next mutating call fail with `reason`
    pub fn fail_next_call(&self, reason: &str) {
        self.state().fail_next = Some(reason.to_string());
    }

    pub fn stale_hint_count(&self) -> u64 {
        self.state().stale_hints
    }

    pub fn mutation_count(&self) -> u64 {
        self.state().mutations
    }

    /// Ids from head to tail
    pub fn list_ids(&self) -> Vec<Pubkey> {
        self.state().list.ids()
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn check_ratio(&self, state: &SimState, collateral: u128, debt: u128) -> CalidaResult<()> {
        let icr = current_ratio(collateral, debt, state.price)?;
        if icr < self.config.min_collateral_ratio {
            return Err(CalidaError::external(
                "lending protocol",
                &format!("ICR {} below minimum {}", icr, self.config.min_collateral_ratio),
            ));
        }
        Ok(())
    }

    fn take_armed_failure(state: &mut SimState, operation: &str) -> CalidaResult<()> {
        match state.fail_next.take() {
            Some(reason) => Err(CalidaError::external(operation, &reason)),
            None => Ok(()),
        }
    }

    fn insert_sorted(state: &mut SimState, position: Pubkey, nicr: u128, hints: &HintPair) {
        if !state.list.insert(position, nicr, hints) {
            state.stale_hints += 1;
            log::debug!("Stale hint for {}, list searched instead", position);
        }
    }
}

impl LendingProtocol for SimulatedProtocol {
    fn open_position(
        &self,
        owner: &Pubkey,
        collateral: u128,
        debt: u128,
        hints: HintPair,
    ) -> CalidaResult<Pubkey> {
        let mut state = self.state();
        Self::take_armed_failure(&mut state, "open_position")?;

        if let Some(existing) = state.positions.get(owner) {
            if existing.status == ExternalPositionStatus::Active {
                return Err(CalidaError::external("open_position", "position already active"));
            }
        }
        if debt == 0 {
            return Err(CalidaError::external("open_position", "debt must be non-zero"));
        }
        self.check_ratio(&state, collateral, debt)?;

        let nicr = nominal_ratio(collateral, debt)?;
        state.positions.insert(
            *owner,
            SimPosition {
                collateral,
                debt,
                status: ExternalPositionStatus::Active,
            },
        );
        Self::insert_sorted(&mut state, *owner, nicr, &hints);
        state.mutations += 1;

        Ok(*owner)
    }

    fn adjust_position(
        &self,
        position: &Pubkey,
        collateral_delta: i128,
        debt_delta: i128,
        hints: HintPair,
    ) -> CalidaResult<()> {
        let mut state = self.state();
        Self::take_armed_failure(&mut state, "adjust_position")?;

        let current = *state
            .positions
            .get(position)
            .ok_or(CalidaError::PositionNotFound { position: *position })?;
        if current.status != ExternalPositionStatus::Active {
            return Err(CalidaError::external("adjust_position", "position is not active"));
        }

        let collateral = apply_delta(current.collateral, collateral_delta)
            .map_err(|_| CalidaError::external("adjust_position", "collateral would go negative"))?;
        let debt = apply_delta(current.debt, debt_delta)
            .map_err(|_| CalidaError::external("adjust_position", "debt would go negative"))?;
        if debt == 0 {
            return Err(CalidaError::external("adjust_position", "debt must stay non-zero"));
        }
        self.check_ratio(&state, collateral, debt)?;

        let nicr = nominal_ratio(collateral, debt)?;
        state.positions.insert(
            *position,
            SimPosition {
                collateral,
                debt,
                status: ExternalPositionStatus::Active,
            },
        );
        state.list.remove(position);
        Self::insert_sorted(&mut state, *position, nicr, &hints);
        state.mutations += 1;

        Ok(())
    }

    fn position_state(&self, position: &Pubkey) -> CalidaResult<PositionState> {
        let state = self.state();
        let entry = state
            .positions
            .get(position)
            .ok_or(CalidaError::PositionNotFound { position: *position })?;
        Ok(PositionState {
            collateral: entry.collateral,
            debt: entry.debt,
        })
    }

    fn position_status(&self, position: &Pubkey) -> CalidaResult<ExternalPositionStatus> {
        Ok(self
            .state()
            .positions
            .get(position)
            .map_or(ExternalPositionStatus::NonExistent, |p| p.status))
    }
}

impl SortedPositions for SimulatedProtocol {
    fn contains(&self, id: &Pubkey) -> bool {
        self.state().list.contains(id)
    }

    fn head(&self) -> Option<Pubkey> {
        self.state().list.head()
    }

    fn tail(&self) -> Option<Pubkey> {
        self.state().list.tail()
    }

    fn next(&self, id: &Pubkey) -> Option<Pubkey> {
        self.state().list.next(id)
    }

    fn prev(&self, id: &Pubkey) -> Option<Pubkey> {
        self.state().list.prev(id)
    }

    fn nominal_ratio(&self, id: &Pubkey) -> Option<u128> {
        self.state().list.nicr(id)
    }

    fn size(&self) -> usize {
        self.state().list.len()
    }
}

impl HintHelper for SimulatedProtocol {
    fn probe_hint(&self, nominal_ratio: u128, seed: u64, probe_count: u32) -> CalidaResult<HintPair> {
        let state = self.state();
        let list = &state.list;

        let Some(mut best) = list.tail() else {
            return Ok(HintPair::empty());
        };
        let distance = |id: &Pubkey| list.nicr(id).map_or(u128::MAX, |n| n.abs_diff(nominal_ratio));
        let mut best_distance = distance(&best);

        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..probe_count {
            let Some(candidate) = list.member(rng.gen_range(0..list.len())) else {
                continue;
            };
            let candidate_distance = distance(&candidate);
            if candidate_distance < best_distance {
                best = candidate;
                best_distance = candidate_distance;
            }
        }

        // Bracket on whichever side of the closest probe the target falls
        let best_nicr = list.nicr(&best).unwrap_or(0);
        Ok(if best_nicr >= nominal_ratio {
            HintPair::new(Some(best), list.next(&best))
        } else {
            HintPair::new(list.prev(&best), Some(best))
        })
    }
}

impl PriceFeed for SimulatedProtocol {
    fn current_price(&self, asset: &Pubkey) -> CalidaResult<u128> {
        if *asset != self.config.collateral_asset {
            return Err(CalidaError::external(
                "current_price",
                &format!("no price for asset {}", asset),
            ));
        }
        Ok(self.state().price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calida_math::units_to_decimal;

    fn protocol() -> SimulatedProtocol {
        SimulatedProtocol::new(SimulationConfig::default())
    }

    #[test]
    fn test_open_and_adjust() {
        let sim = protocol();
        let owner = Pubkey::new_unique();
        sim.open_position(&owner, units_to_decimal(2), units_to_decimal(1), HintPair::empty())
            .unwrap();

        sim.adjust_collateral(&owner, units_to_decimal(1) as i128, HintPair::empty())
            .unwrap();
        let state = sim.position_state(&owner).unwrap();
        assert_eq!(state.collateral, units_to_decimal(3));
        assert_eq!(sim.position_status(&owner).unwrap(), ExternalPositionStatus::Active);
        assert_eq!(sim.mutation_count(), 2);
    }

    #[test]
    fn test_minimum_ratio_is_enforced() {
        let sim = protocol();
        let owner = Pubkey::new_unique();
        let result = sim.open_position(&owner, units_to_decimal(1), units_to_decimal(1), HintPair::empty());
        assert!(matches!(result, Err(CalidaError::ExternalCall { .. })));
        assert_eq!(sim.position_status(&owner).unwrap(), ExternalPositionStatus::NonExistent);
    }

    #[test]
    fn test_armed_failure_leaves_state_unchanged() {
        let sim = protocol();
        let owner = sim
            .open_external_borrower(units_to_decimal(2), units_to_decimal(1))
            .unwrap();
        sim.fail_next_call("rejected");

        assert!(sim.adjust_collateral(&owner, 1, HintPair::empty()).is_err());
        assert_eq!(sim.position_state(&owner).unwrap().collateral, units_to_decimal(2));
        // Armed failure fires only once
        assert!(sim.adjust_collateral(&owner, 1, HintPair::empty()).is_ok());
    }

    #[test]
    fn test_probe_hint_returns_adjacent_pair() {
        let sim = protocol();
        sim.populate_borrowers(50, 7).unwrap();

        let target = 2 * calida_types::NICR_PRECISION;
        let hints = sim.probe_hint(target, 11, 50).unwrap();
        // The probe result is a real adjacent pair even if not the exact slot
        if let (Some(prev), Some(next)) = (hints.prev, hints.next) {
            assert_eq!(sim.next(&prev), Some(next));
        }
    }

    #[test]
    fn test_price_feed_rejects_unknown_asset() {
        let sim = protocol();
        assert_eq!(sim.current_price(&Pubkey::default()).unwrap(), DECIMAL_PRECISION);
        assert!(sim.current_price(&Pubkey::new_unique()).is_err());
    }
}
