//! Session configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Flash erase granularity in bytes
pub const SECTOR_SIZE: u32 = 4096;

/// Size of the image header block withheld until commit
pub const HEADER_BLOCK_SIZE: usize = 16;

/// First byte of every executable image
pub const IMAGE_MAGIC: u8 = 0xE9;

/// Bytes reserved at the start of a FAT data partition
pub const FAT_RESERVED_OFFSET: u32 = 0x1000;

/// Verification key compiled into the build, if any
pub const COMPILED_PUBLIC_KEY: Option<&str> = option_env!("OTAFLASH_PUBLIC_KEY");

/// Configuration of an [`crate::UpdateSession`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Size of one flash sector
    pub sector_size: u32,
    /// Size of the withheld header block
    pub header_block_size: usize,
    /// Magic byte of an executable image
    pub image_magic: u8,
    /// Reserved prefix of the FAT fallback partition
    pub fat_reserved_offset: u32,
    /// Stream read retry budget
    pub stream_retry: StreamRetryPolicy,
    /// Activity indicator
    pub status_led: StatusLedConfig,
    /// Base64 Ed25519 public key; `None` disables the signature gate
    pub verification_key: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            sector_size: SECTOR_SIZE,
            header_block_size: HEADER_BLOCK_SIZE,
            image_magic: IMAGE_MAGIC,
            fat_reserved_offset: FAT_RESERVED_OFFSET,
            stream_retry: StreamRetryPolicy::default(),
            status_led: StatusLedConfig::default(),
            verification_key: COMPILED_PUBLIC_KEY.map(str::to_owned),
        }
    }
}

impl UpdateConfig {
    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Replace the verification key
    pub fn with_verification_key(mut self, key: Option<String>) -> Self {
        self.verification_key = key;
        self
    }

    /// Replace the stream retry policy
    pub fn with_stream_retry(mut self, policy: StreamRetryPolicy) -> Self {
        self.stream_retry = policy;
        self
    }

    /// Check that the values are mutually consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sector_size == 0 {
            return Err(ConfigError::Invalid("sector_size must be non-zero".into()));
        }
        if self.header_block_size == 0 || self.header_block_size > self.sector_size as usize {
            return Err(ConfigError::Invalid(format!(
                "header_block_size must be between 1 and {}",
                self.sector_size
            )));
        }
        if (self.sector_size as usize) % self.header_block_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "header_block_size {} does not divide sector_size {}",
                self.header_block_size, self.sector_size
            )));
        }
        if self.fat_reserved_offset % self.sector_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "fat_reserved_offset {:#x} is not sector aligned",
                self.fat_reserved_offset
            )));
        }
        if self.stream_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "stream_retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Retry budget for stalled stream reads
///
/// Worst-case blocking time of one stalled read is
/// `max_attempts * interval_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamRetryPolicy {
    /// Attempts before declaring a timeout
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    pub interval_ms: u64,
}

impl Default for StreamRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 300,
            interval_ms: 100,
        }
    }
}

impl StreamRetryPolicy {
    /// Pause between attempts
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time spent waiting for one read
    pub fn worst_case(&self) -> Duration {
        self.interval().saturating_mul(self.max_attempts)
    }
}

/// Status LED wiring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLedConfig {
    /// Output pin, `-1` disables the indicator
    pub pin: i32,
    /// Level that lights the LED
    pub active_high: bool,
}

impl Default for StatusLedConfig {
    fn default() -> Self {
        Self {
            pin: -1,
            active_high: true,
        }
    }
}

impl StatusLedConfig {
    /// Whether an indicator pin is configured
    pub fn enabled(&self) -> bool {
        self.pin >= 0
    }

    /// Pin level for the requested LED state
    pub fn level(&self, on: bool) -> bool {
        on == self.active_high
    }
}
