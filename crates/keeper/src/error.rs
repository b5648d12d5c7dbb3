//! Error types for the keeper service

use calida_types::{CalidaError, Pubkey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Vault error: {0}")]
    Vault(#[from] CalidaError),

    #[error("Rebalance of trove {trove} still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        trove: Pubkey,
        attempts: u32,
        last: CalidaError,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type KeeperResult<T> = std::result::Result<T, KeeperError>;

impl From<std::io::Error> for KeeperError {
    fn from(err: std::io::Error) -> Self {
        KeeperError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for KeeperError {
    fn from(err: toml::de::Error) -> Self {
        KeeperError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for KeeperError {
    fn from(err: toml::ser::Error) -> Self {
        KeeperError::SerializationError(err.to_string())
    }
}
