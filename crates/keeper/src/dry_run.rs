//! Dry run against the simulated lending protocol.
//!
//! Builds a vault on an in-memory market described by the keeper
//! configuration, then replays the configured price path one step per pass.

use std::sync::Arc;

use calida_math::parse_decimal;
use calida_simulation::{simulated_handles, SimulatedProtocol, SimulationConfig};
use calida_types::Pubkey;
use calida_vault::StakingVault;

use crate::config::KeeperConfig;
use crate::error::{KeeperError, KeeperResult};
use crate::keeper::{Keeper, PassReport};

pub struct DryRun {
    protocol: Arc<SimulatedProtocol>,
    keeper: Keeper,
    config: KeeperConfig,
    step: usize,
}

impl DryRun {
    pub fn build(config: KeeperConfig) -> KeeperResult<Self> {
        config.validate()?;
        let network = config
            .active_network()
            .ok_or_else(|| KeeperError::InvalidConfig(format!("unknown network '{}'", config.network)))?;
        let settings = &config.simulation;

        let (protocol, handles) = simulated_handles(SimulationConfig {
            initial_price: parse_decimal(&settings.initial_price)?,
            collateral_asset: network.collateral_asset,
            ..SimulationConfig::default()
        });
        let borrowers = protocol.populate_borrowers(settings.borrowers, settings.seed)?;
        log::info!("Simulated market on '{}' with {} borrowers", network.name, borrowers.len());

        let owner = Pubkey::new_unique();
        let router = Pubkey::new_unique();
        let mut vault = StakingVault::new(Pubkey::new_unique(), owner, router, config.vault.to_vault_config()?)?;
        vault.initialize_protocol(&owner, handles)?;

        let trove = vault.deposit(&router, parse_decimal(&settings.initial_deposit)?)?;
        let reserve = parse_decimal(&settings.trove_reserve)?;
        if reserve > 0 {
            vault.fund_trove(&owner, &trove, reserve)?;
        }

        Ok(Self {
            protocol,
            keeper: Keeper::new(vault, config.retry.clone()),
            config,
            step: 0,
        })
    }

    /// Move the price to the next step of the path and run a keeper pass
    pub async fn tick(&mut self) -> KeeperResult<PassReport> {
        let price = self.config.simulation.price_at(self.step)?;
        self.step += 1;
        self.protocol.set_price(price);
        self.keeper.run_once().await
    }

    pub fn keeper(&self) -> &Keeper {
        &self.keeper
    }

    pub fn protocol(&self) -> &Arc<SimulatedProtocol> {
        &self.protocol
    }
}
