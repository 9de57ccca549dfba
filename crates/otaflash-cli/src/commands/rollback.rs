//! Switch the boot slot back to the previous image

use anyhow::Result;
use serde_json::json;

use otaflash_update::UpdateSession;

use crate::device::SimDevice;
use crate::error::CliError;
use crate::output;

/// Execute rollback command
pub fn execute(dir: &std::path::Path, check: bool, json: bool) -> Result<()> {
    let SimDevice { dir, flash } = SimDevice::open(dir)?;
    let mut session = UpdateSession::new(flash);

    if check {
        let available = session.can_roll_back();
        let message = if available {
            "Rollback available"
        } else {
            "No bootable image to roll back to"
        };
        output::print_success(message, json, json!({ "available": available }));
        return Ok(());
    }

    let rolled_back = session.roll_back();
    let device = SimDevice {
        dir,
        flash: session.into_platform(),
    };
    if !rolled_back {
        return Err(CliError::RollbackUnavailable.into());
    }
    device.save()?;
    output::print_success(
        &format!("Boot slot set to {}", device.flash.boot_label()),
        json,
        json!({ "boot": device.flash.boot_label() }),
    );
    Ok(())
}
