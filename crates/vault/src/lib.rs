/// Rebalancing vault core
///
/// A `StakingVault` pools deposits from a yield router into one or more
/// `Trove`s. Each trove holds a single position on an external lending
/// protocol and keeps its collateral ratio inside a configured band, using
/// the `HintResolver` to place the position in the protocol's ordered list.
pub mod config;
pub mod hint;
pub mod shares;
pub mod staking_vault;
pub mod trove;

pub use config::VaultConfig;
pub use hint::{is_valid_bracket, HintResolver};
pub use shares::ShareLedger;
pub use staking_vault::{RebalanceOutcome, StakingVault, TroveRebalance};
pub use trove::Trove;
