//! Trove controller.
//!
//! Owns a single position on the lending protocol and keeps its collateral
//! ratio inside the configured band. A trove starts `Inactive`, may receive
//! idle collateral, and becomes `Active` once `activate` opens the position
//! with that collateral. There is no way back to `Inactive`.
//!
//! Every mutating operation runs its checks and arithmetic first, makes at
//! most one call into the lending protocol, and only then updates local
//! balances and shares. A failed call leaves the trove untouched.

use calida_math::{
    apply_delta, current_ratio, debt_for_ratio, decimal_to_f64, is_within_band, nominal_ratio,
    proportional_debt, required_delta, safe_add_u128, safe_sub_u128, to_signed,
};
use calida_types::{
    CalidaError, CalidaResult, ExternalPositionStatus, HintPair, Payout,
    PositionState, PositionStatus, ProtocolHandles, Pubkey, RebalanceDecision, TroveSnapshot,
};

use crate::config::VaultConfig;
use crate::hint::HintResolver;
use crate::shares::ShareLedger;

#[derive(Debug)]
pub struct Trove {
    /// Identity the external position is opened under
    address: Pubkey,

    /// Identity allowed to set the manager and the protocol handles
    deployer: Pubkey,

    /// Identity allowed to mutate the position, set once
    manager: Option<Pubkey>,

    /// Lending protocol collaborators, set once
    protocol: Option<ProtocolHandles>,

    config: VaultConfig,
    status: PositionStatus,

    /// Position id returned by the lending protocol, set on activation
    position: Option<Pubkey>,

    /// Collateral held by the trove outside the position
    idle_collateral: u128,

    shares: ShareLedger,
    resolver: HintResolver,
}

impl Trove {
    pub fn new(address: Pubkey, deployer: Pubkey, config: VaultConfig) -> CalidaResult<Self> {
        config.validate()?;
        let resolver = HintResolver::new(config.probe_count, config.max_correction_steps);
        Ok(Self {
            address,
            deployer,
            manager: None,
            protocol: None,
            config,
            status: PositionStatus::Inactive,
            position: None,
            idle_collateral: 0,
            shares: ShareLedger::new(),
            resolver,
        })
    }

    // ========================================================================
    // One-time Setup
    // ========================================================================

    pub fn set_manager(&mut self, caller: &Pubkey, manager: Pubkey) -> CalidaResult<()> {
        self.require_deployer(caller)?;
        if self.manager.is_some() {
            return Err(CalidaError::already_initialized("trove manager"));
        }
        log::info!("Trove {} manager set to {}", self.address, manager);
        self.manager = Some(manager);
        Ok(())
    }

    pub fn set_protocol(&mut self, caller: &Pubkey, handles: ProtocolHandles) -> CalidaResult<()> {
        self.require_deployer(caller)?;
        if self.protocol.is_some() {
            return Err(CalidaError::already_initialized("trove protocol handles"));
        }
        self.protocol = Some(handles);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Plain collateral transfer into the idle balance. No shares are minted.
    pub fn receive(&mut self, amount: u128) -> CalidaResult<()> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }
        self.idle_collateral = safe_add_u128(self.idle_collateral, amount)?;
        log::debug!("Trove {} received {} idle collateral", self.address, amount);
        Ok(())
    }

    /// Open the position with the whole idle balance, at the target ratio.
    ///
    /// The seed collateral is credited to the manager as shares.
    pub fn activate(&mut self, caller: &Pubkey) -> CalidaResult<()> {
        let manager = self.require_manager(caller)?;
        if self.status == PositionStatus::Active {
            return Err(CalidaError::AlreadyActive);
        }
        if self.idle_collateral == 0 {
            return Err(CalidaError::NoCollateralBalance);
        }

        let handles = self.handles()?.clone();
        let collateral = self.idle_collateral;
        let price = handles.current_price()?;
        let debt = debt_for_ratio(collateral, price, self.config.target_ratio)?;
        let nicr = nominal_ratio(collateral, debt)?;

        let hints = self.resolve_hints(&handles, nicr, None)?;
        let position = handles
            .lending
            .open_position(&self.address, collateral, debt, hints)?;

        self.shares.mint(&manager, collateral)?;
        self.position = Some(position);
        self.idle_collateral = 0;
        self.status = PositionStatus::Active;

        log::info!(
            "Trove {} activated: collateral {}, debt {}, ICR {:.4}",
            self.address,
            collateral,
            debt,
            decimal_to_f64(current_ratio(collateral, debt, price)?)
        );
        Ok(())
    }

    /// Add `amount` collateral with the debt that keeps the ratio where it is
    pub fn deposit_eth(&mut self, caller: &Pubkey, amount: u128) -> CalidaResult<()> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }
        self.require_manager(caller)?;
        let position = self.require_active()?;

        let handles = self.handles()?.clone();
        let state = handles.lending.position_state(&position)?;
        let extra_debt = proportional_debt(amount, state.collateral, state.debt)?;
        let new_collateral = safe_add_u128(state.collateral, amount)?;
        let new_debt = safe_add_u128(state.debt, extra_debt)?;
        let nicr = nominal_ratio(new_collateral, new_debt)?;

        let hints = self.resolve_hints(&handles, nicr, Some(&position))?;
        handles
            .lending
            .adjust_position(&position, to_signed(amount)?, to_signed(extra_debt)?, hints)?;

        self.shares.mint(caller, amount)?;

        log::info!(
            "Trove {} deposit {}: collateral {} -> {}, debt {} -> {}",
            self.address,
            amount,
            state.collateral,
            new_collateral,
            state.debt,
            new_debt
        );
        Ok(())
    }

    /// Redeem `amount` of the caller's shares for collateral.
    ///
    /// Idle collateral pays first; only the remainder is taken out of the
    /// position, which must keep some collateral.
    pub fn withdraw_eth(&mut self, caller: &Pubkey, amount: u128) -> CalidaResult<Payout> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }
        self.require_manager(caller)?;
        let position = self.require_active()?;

        let balance = self.shares.balance_of(caller);
        if amount > balance {
            return Err(CalidaError::insufficient_balance(amount, balance));
        }

        let from_idle = amount.min(self.idle_collateral);
        let from_position = amount - from_idle;

        if from_position > 0 {
            let handles = self.handles()?.clone();
            let state = handles.lending.position_state(&position)?;
            if from_position >= state.collateral {
                let available = safe_add_u128(self.idle_collateral, state.collateral)?;
                return Err(CalidaError::insufficient_balance(amount, available));
            }
            let new_collateral = safe_sub_u128(state.collateral, from_position)?;
            let nicr = nominal_ratio(new_collateral, state.debt)?;

            let hints = self.resolve_hints(&handles, nicr, Some(&position))?;
            handles
                .lending
                .adjust_collateral(&position, -to_signed(from_position)?, hints)?;

            log::info!(
                "Trove {} position collateral {} -> {}",
                self.address,
                state.collateral,
                new_collateral
            );
        }

        self.shares.burn(caller, amount)?;
        self.idle_collateral -= from_idle;

        log::info!(
            "Trove {} withdrawal {}: {} from idle, {} from position",
            self.address,
            amount,
            from_idle,
            from_position
        );
        Ok(Payout {
            recipient: *caller,
            amount,
        })
    }

    /// Collateral a redemption can draw on: idle balance plus position collateral
    pub fn redeemable_collateral(&self) -> CalidaResult<u128> {
        let state = self.position_state()?;
        safe_add_u128(self.idle_collateral, state.collateral)
    }

    /// Rebalance: move collateral between the idle balance and the position
    /// until the ratio is back at target. A no-op while inside the band.
    pub fn add_collateral(&mut self, caller: &Pubkey) -> CalidaResult<RebalanceDecision> {
        self.require_manager(caller)?;
        let position = self.require_active()?;

        let handles = self.handles()?.clone();
        let state = handles.lending.position_state(&position)?;
        let price = handles.current_price()?;
        let decision = self.decide(&state, price)?;

        if !decision.needs_rebalance() {
            log::debug!(
                "Trove {} in band at ICR {:.4}, nothing to do",
                self.address,
                decimal_to_f64(decision.current_ratio)
            );
            return Ok(decision);
        }

        let magnitude = decision.delta.unsigned_abs();
        let new_idle = if decision.delta > 0 {
            if magnitude > self.idle_collateral {
                return Err(CalidaError::insufficient_balance(magnitude, self.idle_collateral));
            }
            self.idle_collateral - magnitude
        } else {
            safe_add_u128(self.idle_collateral, magnitude)?
        };

        let new_collateral = apply_delta(state.collateral, decision.delta)?;
        let nicr = nominal_ratio(new_collateral, state.debt)?;

        let hints = self.resolve_hints(&handles, nicr, Some(&position))?;
        handles
            .lending
            .adjust_collateral(&position, decision.delta, hints)?;

        self.idle_collateral = new_idle;

        log::info!(
            "Trove {} rebalanced from ICR {:.4}: collateral delta {}, idle now {}",
            self.address,
            decimal_to_f64(decision.current_ratio),
            decision.delta,
            self.idle_collateral
        );
        Ok(decision)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn current_icr(&self) -> CalidaResult<u128> {
        let position = self.require_active()?;
        let handles = self.handles()?;
        let state = handles.lending.position_state(&position)?;
        current_ratio(state.collateral, state.debt, handles.current_price()?)
    }

    /// Where the ratio sits relative to the band, without acting on it
    pub fn rebalance_decision(&self) -> CalidaResult<RebalanceDecision> {
        let position = self.require_active()?;
        let handles = self.handles()?;
        let state = handles.lending.position_state(&position)?;
        self.decide(&state, handles.current_price()?)
    }

    /// Collateral and debt of the external position; zero while inactive
    pub fn position_state(&self) -> CalidaResult<PositionState> {
        match self.position {
            Some(position) => self.handles()?.lending.position_state(&position),
            None => Ok(PositionState::default()),
        }
    }

    /// Status the lending protocol reports for the position
    pub fn external_status(&self) -> CalidaResult<ExternalPositionStatus> {
        match self.position {
            Some(position) => self.handles()?.lending.position_status(&position),
            None => Ok(ExternalPositionStatus::NonExistent),
        }
    }

    pub fn snapshot(&self) -> CalidaResult<TroveSnapshot> {
        let state = self.position_state()?;
        let decision = match self.status {
            PositionStatus::Active => Some(self.rebalance_decision()?),
            PositionStatus::Inactive => None,
        };

        Ok(TroveSnapshot {
            trove: self.address,
            status: self.status,
            idle_collateral: self.idle_collateral,
            collateral: state.collateral,
            debt: state.debt,
            icr: decision.map(|d| d.current_ratio),
            in_band: decision.map(|d| d.in_band),
            share_supply: self.shares.total_supply(),
        })
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn manager(&self) -> Option<Pubkey> {
        self.manager
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn position_id(&self) -> Option<Pubkey> {
        self.position
    }

    pub fn idle_collateral(&self) -> u128 {
        self.idle_collateral
    }

    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn require_deployer(&self, caller: &Pubkey) -> CalidaResult<()> {
        if *caller != self.deployer {
            return Err(CalidaError::unauthorized(*caller, self.deployer));
        }
        Ok(())
    }

    fn require_manager(&self, caller: &Pubkey) -> CalidaResult<Pubkey> {
        let manager = self
            .manager
            .ok_or_else(|| CalidaError::not_initialized("trove manager"))?;
        if *caller != manager {
            return Err(CalidaError::unauthorized(*caller, manager));
        }
        Ok(manager)
    }

    fn require_active(&self) -> CalidaResult<Pubkey> {
        match (self.status, self.position) {
            (PositionStatus::Active, Some(position)) => Ok(position),
            _ => Err(CalidaError::NotActive),
        }
    }

    fn handles(&self) -> CalidaResult<&ProtocolHandles> {
        self.protocol
            .as_ref()
            .ok_or_else(|| CalidaError::not_initialized("trove protocol handles"))
    }

    fn decide(&self, state: &PositionState, price: u128) -> CalidaResult<RebalanceDecision> {
        let ratio = current_ratio(state.collateral, state.debt, price)?;
        let in_band = is_within_band(ratio, self.config.target_ratio, self.config.permitted_deviation);
        let delta = if in_band {
            0
        } else {
            required_delta(state.collateral, state.debt, price, self.config.target_ratio)?
        };
        Ok(RebalanceDecision {
            in_band,
            delta,
            current_ratio: ratio,
        })
    }

    fn resolve_hints(
        &mut self,
        handles: &ProtocolHandles,
        nicr: u128,
        exclude: Option<&Pubkey>,
    ) -> CalidaResult<HintPair> {
        self.resolver.resolve(
            handles.sorted_positions.as_ref(),
            handles.hint_helper.as_ref(),
            nicr,
            exclude,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calida_math::{parse_decimal, units_to_decimal};
    use calida_simulation::{simulated_handles, SimulatedProtocol, SimulationConfig};
    use calida_types::LendingProtocol;
    use std::sync::Arc;

    fn dec(s: &str) -> u128 {
        parse_decimal(s).unwrap()
    }

    struct Fixture {
        sim: Arc<SimulatedProtocol>,
        trove: Trove,
        manager: Pubkey,
    }

    fn fixture() -> Fixture {
        let (sim, handles) = simulated_handles(SimulationConfig::default());
        let deployer = Pubkey::new_unique();
        let manager = Pubkey::new_unique();
        let config = VaultConfig::new(dec("1.2"), dec("0.05")).unwrap();
        let mut trove = Trove::new(Pubkey::new_unique(), deployer, config).unwrap();
        trove.set_manager(&deployer, manager).unwrap();
        trove.set_protocol(&deployer, handles).unwrap();
        Fixture { sim, trove, manager }
    }

    #[test]
    fn test_setup_is_one_time_and_deployer_only() {
        let (_, handles) = simulated_handles(SimulationConfig::default());
        let deployer = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let mut trove = Trove::new(Pubkey::new_unique(), deployer, VaultConfig::default()).unwrap();

        assert!(matches!(
            trove.set_manager(&stranger, stranger),
            Err(CalidaError::Unauthorized { .. })
        ));
        trove.set_manager(&deployer, stranger).unwrap();
        assert!(matches!(
            trove.set_manager(&deployer, deployer),
            Err(CalidaError::AlreadyInitialized { .. })
        ));

        trove.set_protocol(&deployer, handles.clone()).unwrap();
        assert!(matches!(
            trove.set_protocol(&deployer, handles),
            Err(CalidaError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn test_activate_requires_protocol() {
        let deployer = Pubkey::new_unique();
        let mut trove = Trove::new(Pubkey::new_unique(), deployer, VaultConfig::default()).unwrap();
        trove.set_manager(&deployer, deployer).unwrap();
        trove.receive(units_to_decimal(1)).unwrap();

        assert!(matches!(
            trove.activate(&deployer),
            Err(CalidaError::NotInitialized { .. })
        ));
        assert_eq!(trove.status(), PositionStatus::Inactive);
        assert_eq!(trove.idle_collateral(), units_to_decimal(1));
    }

    #[test]
    fn test_activate_lifecycle() {
        let Fixture { sim, mut trove, manager } = fixture();

        assert_eq!(trove.activate(&manager), Err(CalidaError::NoCollateralBalance));

        trove.receive(units_to_decimal(1)).unwrap();
        trove.activate(&manager).unwrap();
        assert!(trove.is_active());
        assert_eq!(trove.idle_collateral(), 0);
        assert_eq!(trove.shares().balance_of(&manager), units_to_decimal(1));
        assert_eq!(trove.current_icr().unwrap(), dec("1.2"));
        assert_eq!(sim.position_state(&trove.address()).unwrap().debt, 833_333_333_333_333_333);

        trove.receive(units_to_decimal(1)).unwrap();
        assert_eq!(trove.activate(&manager), Err(CalidaError::AlreadyActive));
    }

    #[test]
    fn test_only_manager_can_mutate() {
        let Fixture { mut trove, manager, .. } = fixture();
        let stranger = Pubkey::new_unique();
        trove.receive(units_to_decimal(1)).unwrap();

        assert!(matches!(trove.activate(&stranger), Err(CalidaError::Unauthorized { .. })));
        trove.activate(&manager).unwrap();
        assert!(matches!(
            trove.deposit_eth(&stranger, 1),
            Err(CalidaError::Unauthorized { .. })
        ));
        assert!(matches!(
            trove.add_collateral(&stranger),
            Err(CalidaError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_inactive_trove_rejects_mutations() {
        let Fixture { mut trove, manager, .. } = fixture();
        assert_eq!(trove.deposit_eth(&manager, 1), Err(CalidaError::NotActive));
        assert_eq!(trove.withdraw_eth(&manager, 1), Err(CalidaError::NotActive));
        assert_eq!(trove.add_collateral(&manager), Err(CalidaError::NotActive));
        assert_eq!(trove.current_icr(), Err(CalidaError::NotActive));
    }

    #[test]
    fn test_zero_deposit_checked_first() {
        let Fixture { mut trove, .. } = fixture();
        let stranger = Pubkey::new_unique();
        assert_eq!(trove.deposit_eth(&stranger, 0), Err(CalidaError::NonZeroAmountRequired));
    }

    #[test]
    fn test_failed_external_call_changes_nothing() {
        let Fixture { sim, mut trove, manager } = fixture();
        trove.receive(units_to_decimal(1)).unwrap();
        trove.activate(&manager).unwrap();

        sim.fail_next_call("paused");
        assert!(matches!(
            trove.deposit_eth(&manager, units_to_decimal(1)),
            Err(CalidaError::ExternalCall { .. })
        ));
        assert_eq!(trove.shares().total_supply(), units_to_decimal(1));
        assert_eq!(trove.position_state().unwrap().collateral, units_to_decimal(1));
    }

    #[test]
    fn test_rebalance_returns_excess_to_idle() {
        let Fixture { sim, mut trove, manager } = fixture();
        trove.receive(units_to_decimal(1)).unwrap();
        trove.activate(&manager).unwrap();

        // Price up 50%: ICR 1.8, out of band
        sim.set_price(dec("1.5"));
        let decision = trove.add_collateral(&manager).unwrap();
        assert!(!decision.in_band);
        assert!(decision.delta < 0);
        assert_eq!(trove.idle_collateral(), decision.delta.unsigned_abs());

        let icr = trove.current_icr().unwrap();
        assert!(icr >= dec("1.2") && icr <= dec("1.2") + 1);
    }

    #[test]
    fn test_withdraw_pays_from_idle_first() {
        let Fixture { sim, mut trove, manager } = fixture();
        trove.receive(units_to_decimal(1)).unwrap();
        trove.activate(&manager).unwrap();

        sim.set_price(dec("1.5"));
        trove.add_collateral(&manager).unwrap();
        let idle = trove.idle_collateral();
        let position_collateral = trove.position_state().unwrap().collateral;
        assert_eq!(trove.redeemable_collateral().unwrap(), units_to_decimal(1));

        let before = sim.mutation_count();
        let payout = trove.withdraw_eth(&manager, dec("0.2")).unwrap();
        assert_eq!(payout.amount, dec("0.2"));
        assert_eq!(sim.mutation_count(), before);
        assert_eq!(trove.idle_collateral(), idle - dec("0.2"));
        assert_eq!(trove.position_state().unwrap().collateral, position_collateral);
        assert_eq!(trove.shares().balance_of(&manager), dec("0.8"));
    }

    #[test]
    fn test_rebalance_without_idle_collateral_fails_cleanly() {
        let Fixture { sim, mut trove, manager } = fixture();
        trove.receive(units_to_decimal(1)).unwrap();
        trove.activate(&manager).unwrap();

        // Price down to 0.95: ICR 1.14, needs collateral the trove does not hold
        sim.set_price(dec("0.95"));
        let before = sim.mutation_count();
        assert!(matches!(
            trove.add_collateral(&manager),
            Err(CalidaError::InsufficientBalance { .. })
        ));
        assert_eq!(sim.mutation_count(), before);
    }

    #[test]
    fn test_snapshot_of_inactive_trove() {
        let Fixture { mut trove, .. } = fixture();
        trove.receive(5).unwrap();
        let snapshot = trove.snapshot().unwrap();
        assert_eq!(snapshot.status, PositionStatus::Inactive);
        assert_eq!(snapshot.idle_collateral, 5);
        assert_eq!(snapshot.icr, None);
    }
}
