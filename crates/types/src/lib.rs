/// Shared types for the Calida vault
///
/// This crate provides the error type, fixed-point constants, position types
/// and the collaborator interfaces used by the math, vault, simulation and
/// keeper crates.

pub mod constants;
pub mod errors;
pub mod interfaces;
pub mod position;

// Re-export all public types
pub use constants::*;
pub use errors::*;
pub use interfaces::*;
pub use position::*;

pub use solana_program::pubkey::Pubkey;
