//! otaflash - image signing and update tool
//!
//! Creates simulated flash devices, signs firmware images and drives the
//! update engine against them the same way a device would over the air.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod device;
mod error;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::*;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "otaflash")]
#[command(about = "Sign images and flash them into simulated OTA devices")]
#[command(version)]
#[command(long_about = "
otaflash drives the otaflash update engine from the command line. A device
is a directory holding a partition table (device.json) and the raw flash
contents (flash.bin). Images are streamed into the inactive slot, checked
against an optional MD5 and Ed25519 signature and only then made bootable.

Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulated device commands
    #[command(subcommand)]
    Device(DeviceCommands),

    /// Generate an Ed25519 key pair
    Keygen {
        /// File the hex secret key is written to
        secret_out: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Print the MD5 and padded partition SHA-256 of an image
    Digest {
        #[command(flatten)]
        image: ImageArgs,

        /// Partition size the SHA-256 is computed over
        #[arg(long, value_parser = parse_size)]
        capacity: Option<u32>,
    },

    /// Sign an image for a partition of the given size
    Sign {
        #[command(flatten)]
        image: ImageArgs,

        /// File holding the hex secret key
        #[arg(long)]
        key: PathBuf,

        /// Size of the partition the image is flashed into
        #[arg(long, value_parser = parse_size)]
        capacity: u32,
    },

    /// Stream an image into a device and commit it
    Flash(FlashArgs),

    /// Boot the previous image next time
    Rollback {
        /// Device directory
        dir: PathBuf,

        /// Only report whether a rollback is possible
        #[arg(long)]
        check: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("otaflash={},otaflash_update={}", log_level, log_level).into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = execute_command(&cli);

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            std::process::exit(exit_code);
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Device(cmd) => commands::device::execute(cmd, cli.json),
        Commands::Keygen { secret_out, force } => {
            commands::image::keygen(secret_out, *force, cli.json)
        }
        Commands::Digest { image, capacity } => {
            commands::image::digest(&image.image, *capacity, cli.json)
        }
        Commands::Sign {
            image,
            key,
            capacity,
        } => commands::image::sign(&image.image, key, *capacity, cli.json),
        Commands::Flash(args) => commands::flash::execute(args, cli.json),
        Commands::Rollback { dir, check } => commands::rollback::execute(dir, *check, cli.json),
    }
}
