//! Vault configuration

use calida_math::format_decimal;
use calida_types::{
    CalidaError, CalidaResult, DEFAULT_MAX_CORRECTION_STEPS, DEFAULT_PERMITTED_DEVIATION,
    DEFAULT_PROBE_COUNT, DEFAULT_TARGET_RATIO, MAX_PROBE_COUNT,
};

/// Ratio band and hint search parameters shared by a vault and its troves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Collateral ratio the troves are steered to, 18 decimals (1.2 = 120%)
    pub target_ratio: u128,

    /// Half-width of the tolerated band around the target
    pub permitted_deviation: u128,

    /// Random probes per hint lookup
    pub probe_count: u32,

    /// List steps the hint resolver may walk to correct a probe
    pub max_correction_steps: u32,

    /// Collateral above which a trove stops receiving deposits
    pub max_trove_collateral: Option<u128>,
}

impl VaultConfig {
    /// Band configuration with default search parameters
    pub fn new(target_ratio: u128, permitted_deviation: u128) -> CalidaResult<Self> {
        let config = Self {
            target_ratio,
            permitted_deviation,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_probe_count(mut self, probe_count: u32) -> Self {
        self.probe_count = probe_count;
        self
    }

    pub fn with_max_correction_steps(mut self, steps: u32) -> Self {
        self.max_correction_steps = steps;
        self
    }

    pub fn with_max_trove_collateral(mut self, max: Option<u128>) -> Self {
        self.max_trove_collateral = max;
        self
    }

    pub fn validate(&self) -> CalidaResult<()> {
        if self.permitted_deviation == 0 {
            return Err(CalidaError::invalid_parameter("permitted_deviation", "0", "greater than 0"));
        }

        if self.target_ratio <= self.permitted_deviation {
            return Err(CalidaError::invalid_parameter(
                "target_ratio",
                &format_decimal(self.target_ratio),
                &format!("greater than permitted_deviation ({})", format_decimal(self.permitted_deviation)),
            ));
        }

        if self.probe_count > MAX_PROBE_COUNT {
            return Err(CalidaError::invalid_parameter(
                "probe_count",
                &self.probe_count.to_string(),
                &format!("at most {}", MAX_PROBE_COUNT),
            ));
        }

        if self.max_trove_collateral == Some(0) {
            return Err(CalidaError::invalid_parameter("max_trove_collateral", "0", "greater than 0 or unset"));
        }

        Ok(())
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            target_ratio: DEFAULT_TARGET_RATIO,
            permitted_deviation: DEFAULT_PERMITTED_DEVIATION,
            probe_count: DEFAULT_PROBE_COUNT,
            max_correction_steps: DEFAULT_MAX_CORRECTION_STEPS,
            max_trove_collateral: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calida_math::parse_decimal;

    #[test]
    fn test_default_config_is_valid() {
        assert!(VaultConfig::default().validate().is_ok());
    }

    #[test]
    fn test_band_validation() {
        let dec = |s| parse_decimal(s).unwrap();
        assert!(VaultConfig::new(dec("1.2"), dec("0.05")).is_ok());
        assert!(VaultConfig::new(dec("1.2"), 0).is_err());
        assert!(VaultConfig::new(dec("0.05"), dec("0.05")).is_err());
    }

    #[test]
    fn test_search_parameter_validation() {
        let config = VaultConfig::default().with_probe_count(MAX_PROBE_COUNT + 1);
        assert!(matches!(config.validate(), Err(CalidaError::InvalidParameter { .. })));

        let config = VaultConfig::default().with_max_trove_collateral(Some(0));
        assert!(config.validate().is_err());
    }
}
