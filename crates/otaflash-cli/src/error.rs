//! Error types for the otaflash CLI

use otaflash_update::{ConfigError, UpdateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device already exists: {0}")]
    DeviceExists(String),

    #[error("Update failed: {0}")]
    UpdateFailed(#[from] UpdateError),

    #[error("No bootable image to roll back to")]
    RollbackUnavailable,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    #[error("Key error: {0}")]
    KeyError(#[from] otaflash_crypto::CryptoError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::DeviceNotFound(_) => 2,
            CliError::UpdateFailed(_) | CliError::RollbackUnavailable => 3,
            CliError::DeviceExists(_)
            | CliError::ValidationError(_)
            | CliError::InvalidConfiguration(_)
            | CliError::KeyError(_)
            | CliError::JsonError(_) => 4,
            CliError::IoError(_) => 1,
        }
    }
}
