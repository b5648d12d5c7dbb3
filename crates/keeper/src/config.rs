use std::collections::HashSet;
use std::fs;

use calida_math::{format_decimal, parse_decimal};
use calida_types::{
    pubkey_serde, Pubkey, DEFAULT_KEEPER_UPDATE_INTERVAL, DEFAULT_MAX_CORRECTION_STEPS,
    DEFAULT_PERMITTED_DEVIATION, DEFAULT_PROBE_COUNT, DEFAULT_TARGET_RATIO, MAX_KEEPER_RETRIES,
};
use calida_vault::VaultConfig;
use serde::{Deserialize, Serialize};

use crate::error::{KeeperError, KeeperResult};

/// Keeper configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeeperConfig {
    /// Name of the entry in `networks` to run against
    pub network: String,

    /// Seconds between rebalance passes
    pub update_interval_secs: u64,

    /// Band and hint search settings of the vault
    pub vault: VaultSettings,

    /// Retry configuration for stale hints
    pub retry: RetryConfig,

    /// Dry-run market driven by the simulated protocol
    pub simulation: SimulationSettings,

    /// Known protocol deployments
    pub networks: Vec<NetworkConfig>,
}

/// Vault parameters, fixed-point values written as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VaultSettings {
    /// e.g. "1.2" for 120%
    pub target_ratio: String,

    /// e.g. "0.05" for a band of 115%..125%
    pub permitted_deviation: String,

    pub probe_count: u32,
    pub max_correction_steps: u32,

    /// Optional cap on the collateral a single trove takes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_trove_collateral: Option<String>,
}

/// Lending protocol instance on one chain
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,

    #[serde(with = "pubkey_serde")]
    pub lending_protocol: Pubkey,

    #[serde(with = "pubkey_serde")]
    pub sorted_positions: Pubkey,

    #[serde(with = "pubkey_serde")]
    pub hint_helper: Pubkey,

    #[serde(with = "pubkey_serde")]
    pub price_feed: Pubkey,

    /// The default key is the native collateral asset
    #[serde(with = "pubkey_serde")]
    pub collateral_asset: Pubkey,
}

/// Market the dry run drives: starting price, the price path replayed one
/// step per pass, and the borrowers sharing the ordered list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulationSettings {
    pub initial_price: String,
    pub price_path: Vec<String>,
    pub borrowers: usize,
    pub seed: u64,

    /// Collateral the yield router deposits before the first pass
    pub initial_deposit: String,

    /// Idle collateral given to each trove for top-ups
    pub trove_reserve: String,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of retries for failed operations
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl KeeperConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> KeeperResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| KeeperError::Io(format!("Failed to read config file {}: {}", path, e)))?;

        let config: KeeperConfig = toml::from_str(&content)
            .map_err(|e| KeeperError::InvalidConfig(format!("Failed to parse config file {}: {}", path, e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> KeeperResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| KeeperError::Io(format!("Failed to write config file {}: {}", path, e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> KeeperResult<()> {
        if self.update_interval_secs == 0 {
            return Err(KeeperError::InvalidConfig("update_interval_secs must be greater than 0".to_string()));
        }

        let mut chain_ids = HashSet::new();
        for network in &self.networks {
            if network.name.is_empty() {
                return Err(KeeperError::InvalidConfig("network name must not be empty".to_string()));
            }
            if !chain_ids.insert(network.chain_id) {
                return Err(KeeperError::InvalidConfig(format!("duplicate chain id {}", network.chain_id)));
            }
        }

        if self.active_network().is_none() {
            return Err(KeeperError::InvalidConfig(format!(
                "network '{}' is not listed in networks",
                self.network
            )));
        }

        self.vault.to_vault_config()?;
        self.simulation.validate()?;
        self.retry.validate()?;

        Ok(())
    }

    /// The network selected by `network`
    pub fn active_network(&self) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == self.network)
    }
}

impl VaultSettings {
    /// Parse the decimal fields and validate the resulting vault configuration
    pub fn to_vault_config(&self) -> KeeperResult<VaultConfig> {
        let max_trove_collateral = self
            .max_trove_collateral
            .as_deref()
            .map(parse_decimal)
            .transpose()?;

        let config = VaultConfig::new(parse_decimal(&self.target_ratio)?, parse_decimal(&self.permitted_deviation)?)?
            .with_probe_count(self.probe_count)
            .with_max_correction_steps(self.max_correction_steps)
            .with_max_trove_collateral(max_trove_collateral);
        config.validate()?;
        Ok(config)
    }
}

impl SimulationSettings {
    fn validate(&self) -> KeeperResult<()> {
        for price in std::iter::once(&self.initial_price).chain(&self.price_path) {
            if parse_decimal(price)? == 0 {
                return Err(KeeperError::InvalidConfig("simulation prices must be greater than 0".to_string()));
            }
        }

        if parse_decimal(&self.initial_deposit)? == 0 {
            return Err(KeeperError::InvalidConfig("initial_deposit must be greater than 0".to_string()));
        }
        parse_decimal(&self.trove_reserve)?;

        Ok(())
    }

    /// Price for the given pass, cycling through the path
    pub fn price_at(&self, step: usize) -> KeeperResult<u128> {
        if self.price_path.is_empty() {
            return Ok(parse_decimal(&self.initial_price)?);
        }
        Ok(parse_decimal(&self.price_path[step % self.price_path.len()])?)
    }
}

impl RetryConfig {
    /// Validate retry configuration
    fn validate(&self) -> KeeperResult<()> {
        if self.max_retries > MAX_KEEPER_RETRIES {
            return Err(KeeperError::InvalidConfig(format!(
                "max_retries must be at most {}",
                MAX_KEEPER_RETRIES
            )));
        }

        if self.base_delay_ms == 0 {
            return Err(KeeperError::InvalidConfig("base_delay_ms must be greater than 0".to_string()));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(KeeperError::InvalidConfig(format!(
                "max_delay_ms must be greater than or equal to base_delay_ms ({})",
                self.base_delay_ms
            )));
        }

        if self.backoff_multiplier <= 1.0 {
            return Err(KeeperError::InvalidConfig("backoff_multiplier must be greater than 1.0".to_string()));
        }

        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            network: "local".to_string(),
            update_interval_secs: DEFAULT_KEEPER_UPDATE_INTERVAL,
            vault: VaultSettings::default(),
            retry: RetryConfig::default(),
            simulation: SimulationSettings::default(),
            networks: vec![NetworkConfig::local()],
        }
    }
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            target_ratio: format_decimal(DEFAULT_TARGET_RATIO),
            permitted_deviation: format_decimal(DEFAULT_PERMITTED_DEVIATION),
            probe_count: DEFAULT_PROBE_COUNT,
            max_correction_steps: DEFAULT_MAX_CORRECTION_STEPS,
            max_trove_collateral: None,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            initial_price: "1".to_string(),
            price_path: vec!["1".to_string(), "1.1".to_string(), "0.95".to_string(), "1".to_string()],
            borrowers: 100,
            seed: 42,
            initial_deposit: "10".to_string(),
            trove_reserve: "5".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl NetworkConfig {
    /// Local deployment with placeholder identities
    pub fn local() -> Self {
        Self {
            name: "local".to_string(),
            chain_id: 31337,
            lending_protocol: Pubkey::new_from_array([1; 32]),
            sorted_positions: Pubkey::new_from_array([2; 32]),
            hint_helper: Pubkey::new_from_array([3; 32]),
            price_feed: Pubkey::new_from_array([4; 32]),
            collateral_asset: Pubkey::default(),
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> KeeperResult<()> {
    let mut example_config = KeeperConfig::default();
    example_config.vault.max_trove_collateral = Some("1000".to_string());
    example_config.networks.push(NetworkConfig {
        name: "arbitrum".to_string(),
        chain_id: 42161,
        lending_protocol: Pubkey::new_from_array([11; 32]),
        sorted_positions: Pubkey::new_from_array([12; 32]),
        hint_helper: Pubkey::new_from_array([13; 32]),
        price_feed: Pubkey::new_from_array([14; 32]),
        collateral_asset: Pubkey::default(),
    });

    example_config.save(path)?;
    Ok(())
}
