//! Share accounting

use std::collections::BTreeMap;

use calida_math::{safe_add_u128, safe_sub_u128};
use calida_types::{CalidaError, CalidaResult, Pubkey};

/// Fungible claim balances.
///
/// Mint and burn are the only mutators. Each touches exactly one balance and
/// moves the total supply by the same amount, so the balances always sum to
/// the supply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareLedger {
    balances: BTreeMap<Pubkey, u128>,
    total_supply: u128,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, holder: &Pubkey, amount: u128) -> CalidaResult<()> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }

        let balance = self.balance_of(holder);
        let new_balance = safe_add_u128(balance, amount)?;
        let new_supply = safe_add_u128(self.total_supply, amount)?;

        self.balances.insert(*holder, new_balance);
        self.total_supply = new_supply;
        Ok(())
    }

    pub fn burn(&mut self, holder: &Pubkey, amount: u128) -> CalidaResult<()> {
        if amount == 0 {
            return Err(CalidaError::NonZeroAmountRequired);
        }

        let balance = self.balance_of(holder);
        if amount > balance {
            return Err(CalidaError::insufficient_balance(amount, balance));
        }
        let new_supply = safe_sub_u128(self.total_supply, amount)?;

        match balance - amount {
            0 => self.balances.remove(holder),
            remaining => self.balances.insert(*holder, remaining),
        };
        self.total_supply = new_supply;
        Ok(())
    }

    pub fn balance_of(&self, holder: &Pubkey) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Non-zero balances ordered by holder
    pub fn holders(&self) -> Vec<(Pubkey, u128)> {
        self.balances.iter().map(|(holder, balance)| (*holder, *balance)).collect()
    }
}
