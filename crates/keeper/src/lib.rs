pub mod config;
pub mod dry_run;
pub mod error;
pub mod keeper;

pub use config::{KeeperConfig, NetworkConfig, RetryConfig, SimulationSettings, VaultSettings};
pub use dry_run::DryRun;
pub use error::{KeeperError, KeeperResult};
pub use keeper::{Keeper, PassReport};
