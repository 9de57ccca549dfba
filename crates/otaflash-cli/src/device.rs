//! Simulated devices persisted in a directory
//!
//! A device directory holds `device.json` (partition table plus boot state)
//! and `flash.bin` (raw flash contents).

use std::fs;
use std::path::{Path, PathBuf};

use otaflash_update::sim::{DeviceLayout, MemoryFlash};
use tracing::debug;

use crate::error::CliError;

pub const LAYOUT_FILE: &str = "device.json";
pub const FLASH_FILE: &str = "flash.bin";

/// Default application slot size
pub const DEFAULT_SLOT_SIZE: u32 = 0x10_0000;
/// Default data volume size
pub const DEFAULT_DATA_SIZE: u32 = 0x6_0000;

#[derive(Debug)]
pub struct SimDevice {
    pub dir: PathBuf,
    pub flash: MemoryFlash,
}

impl SimDevice {
    /// Create an erased device in `dir`
    pub fn create(dir: &Path, layout: DeviceLayout, force: bool) -> Result<Self, CliError> {
        if dir.join(LAYOUT_FILE).exists() && !force {
            return Err(CliError::DeviceExists(dir.display().to_string()));
        }
        fs::create_dir_all(dir)?;
        let device = Self {
            dir: dir.to_path_buf(),
            flash: MemoryFlash::new(layout),
        };
        device.save()?;
        Ok(device)
    }

    /// Load the device stored in `dir`
    pub fn open(dir: &Path) -> Result<Self, CliError> {
        let layout_path = dir.join(LAYOUT_FILE);
        if !layout_path.is_file() {
            return Err(CliError::DeviceNotFound(dir.display().to_string()));
        }
        let layout: DeviceLayout = serde_json::from_str(&fs::read_to_string(&layout_path)?)?;

        let flash_path = dir.join(FLASH_FILE);
        let contents = if flash_path.is_file() {
            fs::read(&flash_path)?
        } else {
            Vec::new()
        };
        if contents.len() > layout.flash_size() {
            return Err(CliError::ValidationError(format!(
                "{} is larger than the partition table ({} > {} bytes)",
                flash_path.display(),
                contents.len(),
                layout.flash_size()
            )));
        }

        debug!("opened device {} ({} bytes)", dir.display(), contents.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            flash: MemoryFlash::from_image(layout, contents),
        })
    }

    /// Write layout and flash contents back to disk
    pub fn save(&self) -> Result<(), CliError> {
        let layout = serde_json::to_string_pretty(self.flash.layout())?;
        fs::write(self.dir.join(LAYOUT_FILE), layout)?;
        fs::write(self.dir.join(FLASH_FILE), self.flash.image())?;
        debug!("saved device {}", self.dir.display());
        Ok(())
    }
}
