//! Shared fixtures for the vault integration tests

#![allow(dead_code)]

use std::sync::Arc;

use calida_math::parse_decimal;
use calida_simulation::{simulated_handles, SimulatedProtocol, SimulationConfig};
use calida_types::{ProtocolHandles, Pubkey};
use calida_vault::{StakingVault, Trove, VaultConfig};

pub fn dec(s: &str) -> u128 {
    parse_decimal(s).unwrap()
}

/// Target 1.2, deviation 0.05
pub fn band_config() -> VaultConfig {
    VaultConfig::new(dec("1.2"), dec("0.05")).unwrap()
}

pub struct TroveEnv {
    pub sim: Arc<SimulatedProtocol>,
    pub handles: ProtocolHandles,
    pub trove: Trove,
    pub manager: Pubkey,
}

/// A configured but inactive trove on a simulated protocol priced at 1.0
pub fn trove_env(config: VaultConfig) -> TroveEnv {
    let (sim, handles) = simulated_handles(SimulationConfig::default());
    let deployer = Pubkey::new_unique();
    let manager = Pubkey::new_unique();

    let mut trove = Trove::new(Pubkey::new_unique(), deployer, config).unwrap();
    trove.set_manager(&deployer, manager).unwrap();
    trove.set_protocol(&deployer, handles.clone()).unwrap();

    TroveEnv {
        sim,
        handles,
        trove,
        manager,
    }
}

/// Trove activated with `seed` collateral
pub fn active_trove_env(config: VaultConfig, seed: u128) -> TroveEnv {
    let mut env = trove_env(config);
    env.trove.receive(seed).unwrap();
    env.trove.activate(&env.manager).unwrap();
    env
}

pub struct VaultEnv {
    pub sim: Arc<SimulatedProtocol>,
    pub vault: StakingVault,
    pub owner: Pubkey,
    pub router: Pubkey,
}

/// Initialized staking vault on a simulated protocol priced at 1.0
pub fn vault_env(config: VaultConfig) -> VaultEnv {
    let (sim, handles) = simulated_handles(SimulationConfig::default());
    let owner = Pubkey::new_unique();
    let router = Pubkey::new_unique();

    let mut vault = StakingVault::new(Pubkey::new_unique(), owner, router, config).unwrap();
    vault.initialize_protocol(&owner, handles).unwrap();

    VaultEnv {
        sim,
        vault,
        owner,
        router,
    }
}
