//! Flash an image into a simulated device

use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tracing::{debug, info};

use otaflash_update::prelude::*;
use otaflash_update::sim::MemoryFlash;

use crate::commands::parse_size;
use crate::device::SimDevice;
use crate::error::CliError;
use crate::output;

#[derive(Args, Debug)]
pub struct FlashArgs {
    /// Device directory
    pub dir: PathBuf,

    /// Image file
    pub image: PathBuf,

    /// Write a filesystem image to the data volume instead of firmware
    #[arg(long)]
    pub data: bool,

    /// Label of the data volume
    #[arg(long, requires = "data")]
    pub label: Option<String>,

    /// Expected MD5 of the image (32 hex characters)
    #[arg(long)]
    pub md5: Option<String>,

    /// Hex Ed25519 signature of the partition SHA-256
    #[arg(long)]
    pub signature: Option<String>,

    /// Base64 public key that signatures are checked against
    #[arg(long)]
    pub public_key: Option<String>,

    /// Declared image size, defaults to the file size
    #[arg(long, value_parser = parse_size)]
    pub size: Option<u32>,

    /// Commit even if fewer bytes than declared were written
    #[arg(long)]
    pub allow_short: bool,

    /// Session configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl FlashArgs {
    fn target(&self) -> TargetKind {
        if self.data {
            TargetKind::DataVolume {
                label: self.label.clone(),
            }
        } else {
            TargetKind::Firmware
        }
    }

    fn session_config(&self) -> Result<UpdateConfig, CliError> {
        let config = match &self.config {
            Some(path) => UpdateConfig::load(path)?,
            None => UpdateConfig::default(),
        };
        Ok(match &self.public_key {
            Some(key) => config.with_verification_key(Some(key.clone())),
            None => config,
        })
    }
}

/// Execute flash command
pub fn execute(args: &FlashArgs, json: bool) -> Result<()> {
    let SimDevice { dir, flash } = SimDevice::open(&args.dir)?;
    let config = args.session_config()?;

    let file_len = fs::metadata(&args.image).map_err(CliError::from)?.len();
    let file_len = u32::try_from(file_len).map_err(|e| {
        CliError::ValidationError(format!("{} is too large: {}", args.image.display(), e))
    })?;
    let declared = args.size.unwrap_or(file_len);

    let mut session = UpdateSession::with_config(flash, config);
    let bar = (!json).then(|| output::transfer_bar(declared));
    if let Some(bar) = bar.clone() {
        session.on_progress(move |written, total| {
            bar.set_length(u64::from(total));
            bar.set_position(u64::from(written));
        });
    }

    if let Some(md5) = &args.md5 {
        session
            .set_expected_checksum(md5)
            .map_err(CliError::from)?;
    }
    if let Some(signature) = &args.signature {
        session.set_expected_signature(signature.as_str());
    }

    let result = transfer(&mut session, args, declared, file_len);
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let device = SimDevice {
        dir,
        flash: session.into_platform(),
    };
    device.save()?;
    let written = result?;

    let boot = device.flash.boot_label();
    info!("flashed {} bytes, boot slot {}", written, boot);
    output::print_success(
        &format!("Flashed {} bytes from {}", written, args.image.display()),
        json,
        json!({
            "bytes": written,
            "boot": boot,
            "running": device.flash.running_label(),
        }),
    );
    Ok(())
}

/// Run one session, returning the bytes committed
fn transfer(
    session: &mut UpdateSession<MemoryFlash>,
    args: &FlashArgs,
    declared: u32,
    file_len: u32,
) -> Result<u32, CliError> {
    session.begin(declared, args.target())?;

    // A short file would leave the stream waiting for bytes that never come
    let accepted = if file_len >= declared {
        let reader = BufReader::new(File::open(&args.image)?);
        session.write_stream(&mut ReaderSource::new(reader))
    } else {
        session.write(&fs::read(&args.image)?)
    };
    debug!("accepted {} of {} bytes", accepted, declared);

    session.end(args.allow_short)?;
    Ok(u32::try_from(accepted).unwrap_or(declared))
}
