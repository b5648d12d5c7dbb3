/// Protocol constants shared by the vault crates

// ============================================================================
// Fixed-Point Constants
// ============================================================================

/// Number of fractional decimal digits used by every amount, price and ratio
pub const DECIMALS: u32 = 18;

/// 1.0 in the lending protocol's decimal fixed point (1e18)
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Scale of the nominal ratio the ordered list is keyed by (1e20)
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

// ============================================================================
// Collateral Ratio Constants
// ============================================================================

/// Minimum collateral ratio enforced by the lending protocol (110%)
pub const MIN_COLLATERAL_RATIO: u128 = 1_100_000_000_000_000_000;

/// Default target ratio (120%)
pub const DEFAULT_TARGET_RATIO: u128 = 1_200_000_000_000_000_000;

/// Default permitted deviation around the target (5%)
pub const DEFAULT_PERMITTED_DEVIATION: u128 = 50_000_000_000_000_000;

// ============================================================================
// Hint Resolution Constants
// ============================================================================

/// Default number of random probes per hint request
pub const DEFAULT_PROBE_COUNT: u32 = 15;

/// Upper bound accepted for the probe count
pub const MAX_PROBE_COUNT: u32 = 1_000;

/// Default number of list steps allowed to correct a stale bracket
pub const DEFAULT_MAX_CORRECTION_STEPS: u32 = 10;

// ============================================================================
// Keeper Constants
// ============================================================================

/// Default keeper update interval (seconds)
pub const DEFAULT_KEEPER_UPDATE_INTERVAL: u64 = 60;

/// Maximum keeper retries for a stale hint
pub const MAX_KEEPER_RETRIES: u32 = 10;
