//! Staking vault: the pool coordinator.
//!
//! Holds the band configuration shared by its troves, routes yield-router
//! deposits and withdrawals to individual troves, and exposes a
//! permissionless `rebalance` for an external keeper to call. The vault is
//! deployer and manager of every trove it creates, so all trove shares are
//! held by the vault while depositors hold pool shares.

use calida_math::safe_add_u128;
use calida_types::{
    CalidaError, CalidaResult, ExternalPositionStatus, Payout, ProtocolHandles, Pubkey,
    RebalanceDecision, VaultSnapshot,
};

use crate::config::VaultConfig;
use crate::shares::ShareLedger;
use crate::trove::Trove;

/// What happened to one trove during a rebalance pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    /// Ratio inside the band, nothing moved
    InBand { ratio: u128 },
    /// Collateral moved back towards target
    Rebalanced(RebalanceDecision),
    /// The trove could not be rebalanced; other troves are unaffected
    Failed(CalidaError),
}

impl RebalanceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Failed in a way that a later attempt with fresh hints may fix
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(err) if err.is_retryable())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TroveRebalance {
    pub trove: Pubkey,
    pub outcome: RebalanceOutcome,
}

#[derive(Debug)]
pub struct StakingVault {
    address: Pubkey,
    owner: Pubkey,
    yield_router: Pubkey,
    config: VaultConfig,
    protocol: Option<ProtocolHandles>,
    troves: Vec<Trove>,
    shares: ShareLedger,
}

impl StakingVault {
    pub fn new(address: Pubkey, owner: Pubkey, yield_router: Pubkey, config: VaultConfig) -> CalidaResult<Self> {
        config.validate()?;
        Ok(Self {
            address,
            owner,
            yield_router,
            config,
            protocol: None,
            troves: Vec::new(),
            shares: ShareLedger::new(),
        })
    }

    pub fn initialize_protocol(&mut self, caller: &Pubkey, handles: ProtocolHandles) -> CalidaResult<()> {
        self.require_owner(caller)?;
        if self.protocol.is_some() {
            return Err(CalidaError::already_initialized("vault protocol handles"));
        }
        log::info!("Vault {} protocol initialized: {:?}", self.address, handles);
        self.protocol = Some(handles);
        Ok(())
    }

    // ========================================================================
    // Yield Router Entry Points
    // ========================================================================

    /// Route `amount` to a trove and mint the same amount of pool shares.
    ///
    /// Returns the trove that took the deposit.
    pub fn deposit(&mut self, caller: &Pubkey, amount: u128) -> CalidaResult<Pubkey> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }
        self.require_yield_router(caller)?;
        self.handles()?;

        let trove = match self.find_deposit_target(amount) {
            Some(index) => {
                let vault = self.address;
                let trove = &mut self.troves[index];
                trove.deposit_eth(&vault, amount)?;
                trove.address()
            }
            None => self.open_trove(amount)?,
        };

        self.shares.mint(caller, amount)?;
        log::info!("Vault {} deposit {} routed to trove {}", self.address, amount, trove);
        Ok(trove)
    }

    /// Burn `amount` pool shares and redeem them from a single trove
    pub fn withdraw(&mut self, caller: &Pubkey, amount: u128) -> CalidaResult<Payout> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }
        self.require_yield_router(caller)?;
        self.handles()?;

        let balance = self.shares.balance_of(caller);
        if amount > balance {
            return Err(CalidaError::insufficient_balance(amount, balance));
        }

        let index = self.find_withdraw_source(amount)?;
        let vault = self.address;
        let trove = &mut self.troves[index];
        trove.withdraw_eth(&vault, amount)?;
        let trove_address = trove.address();

        self.shares.burn(caller, amount)?;
        log::info!("Vault {} withdrawal {} served by trove {}", self.address, amount, trove_address);
        Ok(Payout {
            recipient: *caller,
            amount,
        })
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Move collateral into a trove's idle balance, for rebalances that need to add collateral
    pub fn fund_trove(&mut self, caller: &Pubkey, trove: &Pubkey, amount: u128) -> CalidaResult<()> {
        self.require_owner(caller)?;
        let index = self.trove_index(trove)?;
        self.troves[index].receive(amount)
    }

    /// Bring every active trove that left the band back to target.
    ///
    /// Anyone may call this. Each trove is handled on its own: a failure is
    /// reported for that trove and the pass continues.
    pub fn rebalance(&mut self) -> CalidaResult<Vec<TroveRebalance>> {
        self.handles()?;

        let mut results = Vec::new();
        for index in 0..self.troves.len() {
            let trove = &self.troves[index];
            if !trove.is_active() {
                continue;
            }
            match trove.external_status() {
                Ok(ExternalPositionStatus::Active) => {}
                Ok(status) => {
                    log::debug!("Skipping trove {}: external status {:?}", trove.address(), status);
                    continue;
                }
                Err(err) => {
                    results.push(TroveRebalance {
                        trove: trove.address(),
                        outcome: RebalanceOutcome::Failed(err),
                    });
                    continue;
                }
            }
            results.push(TroveRebalance {
                trove: self.troves[index].address(),
                outcome: self.rebalance_at(index),
            });
        }

        let failed = results.iter().filter(|r| r.outcome.is_failure()).count();
        if failed > 0 {
            log::warn!("Vault {} rebalance: {} of {} troves failed", self.address, failed, results.len());
        }
        Ok(results)
    }

    /// Rebalance a single trove
    pub fn rebalance_trove(&mut self, trove: &Pubkey) -> CalidaResult<RebalanceOutcome> {
        self.handles()?;
        let index = self.trove_index(trove)?;
        if !self.troves[index].is_active() {
            return Err(CalidaError::NotActive);
        }
        Ok(self.rebalance_at(index))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn snapshot(&self) -> CalidaResult<VaultSnapshot> {
        let troves = self
            .troves
            .iter()
            .map(Trove::snapshot)
            .collect::<CalidaResult<Vec<_>>>()?;

        let mut total_collateral = 0u128;
        for trove in &troves {
            total_collateral = safe_add_u128(total_collateral, trove.collateral)?;
        }

        Ok(VaultSnapshot {
            vault: self.address,
            total_shares: self.shares.total_supply(),
            total_collateral,
            troves,
        })
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn owner(&self) -> Pubkey {
        self.owner
    }

    pub fn yield_router(&self) -> Pubkey {
        self.yield_router
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    pub fn troves(&self) -> &[Trove] {
        &self.troves
    }

    pub fn trove(&self, address: &Pubkey) -> Option<&Trove> {
        self.troves.iter().find(|t| t.address() == *address)
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn require_owner(&self, caller: &Pubkey) -> CalidaResult<()> {
        if *caller != self.owner {
            return Err(CalidaError::unauthorized(*caller, self.owner));
        }
        Ok(())
    }

    fn require_yield_router(&self, caller: &Pubkey) -> CalidaResult<()> {
        if *caller != self.yield_router {
            return Err(CalidaError::unauthorized(*caller, self.yield_router));
        }
        Ok(())
    }

    fn handles(&self) -> CalidaResult<&ProtocolHandles> {
        self.protocol
            .as_ref()
            .ok_or_else(|| CalidaError::not_initialized("vault protocol handles"))
    }

    fn trove_index(&self, address: &Pubkey) -> CalidaResult<usize> {
        self.troves
            .iter()
            .position(|t| t.address() == *address)
            .ok_or(CalidaError::PositionNotFound { position: *address })
    }

    /// Active troves whose external position is still open, with their collateral
    fn open_troves(&self) -> Vec<(usize, u128)> {
        self.troves
            .iter()
            .enumerate()
            .filter(|(_, trove)| trove.is_active())
            .filter_map(|(index, trove)| {
                match (trove.external_status(), trove.position_state()) {
                    (Ok(ExternalPositionStatus::Active), Ok(state)) => Some((index, state.collateral)),
                    (status, _) => {
                        log::warn!("Skipping trove {}: external status {:?}", trove.address(), status);
                        None
                    }
                }
            })
            .collect()
    }

    /// First open trove with room for `amount`
    fn find_deposit_target(&self, amount: u128) -> Option<usize> {
        self.open_troves()
            .into_iter()
            .find(|(_, collateral)| match self.config.max_trove_collateral {
                Some(max) => collateral.checked_add(amount).map_or(false, |total| total <= max),
                None => true,
            })
            .map(|(index, _)| index)
    }

    /// Largest open trove that can cover `amount` on its own, counting its
    /// idle collateral
    fn find_withdraw_source(&self, amount: u128) -> CalidaResult<usize> {
        let mut candidates = self
            .open_troves()
            .into_iter()
            .map(|(index, collateral)| (index, collateral.saturating_add(self.troves[index].idle_collateral())))
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let largest = candidates.first().map_or(0, |(_, redeemable)| *redeemable);
        candidates
            .into_iter()
            .find(|(index, redeemable)| {
                *redeemable > amount && self.troves[*index].shares().balance_of(&self.address) >= amount
            })
            .map(|(index, _)| index)
            .ok_or_else(|| CalidaError::insufficient_balance(amount, largest))
    }

    /// Create, seed and activate a trove holding `amount`
    fn open_trove(&mut self, amount: u128) -> CalidaResult<Pubkey> {
        let handles = self.handles()?.clone();
        let address = self.derive_trove_address(self.troves.len() as u64);

        let mut trove = Trove::new(address, self.address, self.config.clone())?;
        trove.set_manager(&self.address, self.address)?;
        trove.set_protocol(&self.address, handles)?;
        trove.receive(amount)?;
        trove.activate(&self.address)?;

        log::info!("Vault {} opened trove #{} at {}", self.address, self.troves.len(), address);
        self.troves.push(trove);
        Ok(address)
    }

    /// Trove identity derived from the vault identity and the trove's index
    fn derive_trove_address(&self, index: u64) -> Pubkey {
        let mut bytes = self.address.to_bytes();
        let salt = (index + 1).to_le_bytes();
        for (byte, salt) in bytes[24..].iter_mut().zip(salt) {
            *byte ^= salt;
        }
        Pubkey::new_from_array(bytes)
    }

    fn rebalance_at(&mut self, index: usize) -> RebalanceOutcome {
        let vault = self.address;
        let trove = &mut self.troves[index];

        let outcome = match trove.rebalance_decision() {
            Ok(decision) if !decision.needs_rebalance() => RebalanceOutcome::InBand {
                ratio: decision.current_ratio,
            },
            Ok(_) => match trove.add_collateral(&vault) {
                Ok(decision) => RebalanceOutcome::Rebalanced(decision),
                Err(err) => RebalanceOutcome::Failed(err),
            },
            Err(err) => RebalanceOutcome::Failed(err),
        };

        if let RebalanceOutcome::Failed(err) = &outcome {
            log::warn!("Rebalance of trove {} failed: {}", trove.address(), err);
        }
        outcome
    }
}
