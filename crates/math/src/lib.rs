/// Mathematical utilities for the Calida vault
///
/// This crate provides safe arithmetic, decimal fixed-point helpers and the
/// collateral ratio functions shared by the vault, simulation and keeper.

pub mod fixed_point;
pub mod ratio;
pub mod safe;

// Re-export commonly used functions
pub use fixed_point::*;
pub use ratio::*;
pub use safe::*;
