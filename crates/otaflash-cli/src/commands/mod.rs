//! Command implementations

pub mod device;
pub mod flash;
pub mod image;
pub mod rollback;

use std::path::PathBuf;

use clap::{Args, Subcommand};

pub use flash::FlashArgs;

/// Simulated device commands
#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Create an erased device with the default partition table
    Init {
        /// Device directory
        dir: PathBuf,

        /// Size of each application slot
        #[arg(long, default_value = "0x100000", value_parser = parse_size)]
        slot_size: u32,

        /// Size of the data volume
        #[arg(long, default_value = "0x60000", value_parser = parse_size)]
        data_size: u32,

        /// Replace an existing device
        #[arg(long)]
        force: bool,
    },

    /// Show partitions, running and boot slot
    Status {
        /// Device directory
        dir: PathBuf,
    },

    /// Restart the device into its boot slot
    Reboot {
        /// Device directory
        dir: PathBuf,
    },
}

/// Arguments shared by the image commands
#[derive(Args)]
pub struct ImageArgs {
    /// Image file
    pub image: PathBuf,
}

/// Parse a byte count given in decimal or `0x` hex
pub fn parse_size(text: &str) -> Result<u32, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid size '{}': {}", text, e))
}
