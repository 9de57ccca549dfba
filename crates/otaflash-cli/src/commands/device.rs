//! Device management commands

use anyhow::Result;
use serde_json::json;
use tracing::info;

use otaflash_update::{HeaderGuard, UpdateConfig};
use otaflash_update::partition::PartitionType;
use otaflash_update::sector::is_bootable;
use otaflash_update::sim::DeviceLayout;

use crate::commands::DeviceCommands;
use crate::device::SimDevice;
use crate::output;

/// Execute device command
pub fn execute(cmd: &DeviceCommands, json: bool) -> Result<()> {
    match cmd {
        DeviceCommands::Init {
            dir,
            slot_size,
            data_size,
            force,
        } => {
            let device = SimDevice::create(dir, DeviceLayout::standard(*slot_size, *data_size), *force)?;
            info!("created device in {}", dir.display());
            output::print_success(
                &format!("Created device in {}", dir.display()),
                json,
                json!({
                    "flash_size": device.flash.image().len(),
                    "boot": device.flash.boot_label(),
                }),
            );
            Ok(())
        }
        DeviceCommands::Status { dir } => {
            let device = SimDevice::open(dir)?;
            let guard = HeaderGuard::from(&UpdateConfig::default());
            let bootable: Vec<(String, bool)> = device
                .flash
                .layout()
                .partitions
                .iter()
                .filter(|p| p.kind == PartitionType::App)
                .map(|p| (p.label.clone(), is_bootable(&device.flash, p, guard)))
                .collect();
            output::print_device_status(device.flash.layout(), &bootable, json);
            Ok(())
        }
        DeviceCommands::Reboot { dir } => {
            let mut device = SimDevice::open(dir)?;
            device.flash.reboot();
            device.save()?;
            output::print_success(
                &format!("Running {}", device.flash.running_label()),
                json,
                json!({ "running": device.flash.running_label() }),
            );
            Ok(())
        }
    }
}
