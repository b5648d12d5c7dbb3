use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

/// Lifecycle of a trove controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Deployed, may hold idle collateral, no external position yet
    Inactive,
    /// External position is open
    Active,
}

/// Status of a position as reported by the lending protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalPositionStatus {
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

/// Collateral and debt of an external position, both 18-decimal fixed point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub collateral: u128,
    pub debt: u128,
}

/// Neighbours in the ordered list between which a position should be linked.
///
/// `prev` is the entry closer to the head (higher ratio), `next` the one closer
/// to the tail. `None` on either side means the list boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HintPair {
    pub prev: Option<Pubkey>,
    pub next: Option<Pubkey>,
}

impl HintPair {
    pub fn new(prev: Option<Pubkey>, next: Option<Pubkey>) -> Self {
        Self { prev, next }
    }

    /// Bracket for an empty list
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Outcome of comparing the current ratio with the target band.
///
/// `delta` is the signed collateral amount that would bring the ratio back to
/// target: positive to add, negative to remove. Derived on every check and
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceDecision {
    pub in_band: bool,
    pub delta: i128,
    pub current_ratio: u128,
}

impl RebalanceDecision {
    pub fn needs_rebalance(&self) -> bool {
        !self.in_band && self.delta != 0
    }
}

/// Collateral released by a withdrawal, to be paid out by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub recipient: Pubkey,
    pub amount: u128,
}

/// Point-in-time view of one trove, for monitoring and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveSnapshot {
    #[serde(with = "crate::pubkey_serde")]
    pub trove: Pubkey,
    pub status: PositionStatus,
    pub idle_collateral: u128,
    pub collateral: u128,
    pub debt: u128,
    /// `None` while inactive
    pub icr: Option<u128>,
    pub in_band: Option<bool>,
    pub share_supply: u128,
}

/// Point-in-time view of a staking vault and all of its troves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    #[serde(with = "crate::pubkey_serde")]
    pub vault: Pubkey,
    pub total_shares: u128,
    pub total_collateral: u128,
    pub troves: Vec<TroveSnapshot>,
}

/// Serde helper that stores a `Pubkey` as its base58 string
pub mod pubkey_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_program::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&pubkey.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pubkey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebalance_decision() {
        let in_band = RebalanceDecision { in_band: true, delta: -5, current_ratio: 0 };
        assert!(!in_band.needs_rebalance());

        let drifted = RebalanceDecision { in_band: false, delta: 42, current_ratio: 0 };
        assert!(drifted.needs_rebalance());
    }

    #[test]
    fn test_snapshot_serializes_pubkey_as_string() {
        let trove = Pubkey::new_unique();
        let snapshot = TroveSnapshot {
            trove,
            status: PositionStatus::Active,
            idle_collateral: 0,
            collateral: 10,
            debt: 8,
            icr: Some(1),
            in_band: Some(true),
            share_supply: 10,
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains(&trove.to_string()));

        let back: TroveSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
