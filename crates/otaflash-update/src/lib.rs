//! Power-loss safe image updates for flash-partitioned devices
//!
//! This crate streams a firmware or filesystem image into an inactive
//! partition and only makes it bootable once it has been verified:
//! - Sector sized erase/write batching
//! - Header block withheld until commit, so a torn transfer never boots
//! - MD5 check against an expected checksum
//! - Ed25519 check of the partition SHA-256 against a compiled-in key
//! - OTA slot and data volume target resolution
//!
//! # Architecture
//!
//! - [`session`]: Update session state machine
//! - [`sector`]: Sector buffer and bootability guard
//! - [`checksum`]: Rolling image checksum
//! - [`signature`]: Signature gate
//! - [`partition`]: Partition model and target resolution
//! - [`platform`]: Flash and status pin capabilities supplied by the host
//! - [`stream`]: Byte sources for streamed updates
//! - [`sim`]: In-memory flash device
//! - [`config`]: Session configuration
//! - [`error`]: Error types
//!
//! # Safety
//!
//! Only one update runs per session object. The boot partition changes
//! only after every check passed; any failure leaves it untouched.
//!
//! # Example
//!
//! ```
//! use otaflash_update::prelude::*;
//! use otaflash_update::sim::{DeviceLayout, MemoryFlash};
//!
//! let flash = MemoryFlash::new(DeviceLayout::standard(0x4000, 0x4000));
//! let config = UpdateConfig::default().with_verification_key(None);
//! let mut session = UpdateSession::with_config(flash, config);
//!
//! let mut image = vec![0u8; 1024];
//! image[0] = 0xE9;
//!
//! session.begin(1024, TargetKind::Firmware)?;
//! assert_eq!(session.write(&image), 1024);
//! session.end(false)?;
//!
//! assert_eq!(session.platform().boot_label(), "ota_1");
//! # Ok::<(), otaflash_update::UpdateError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod checksum;
pub mod config;
pub mod error;
pub mod partition;
pub mod platform;
pub mod prelude;
pub mod sector;
pub mod session;
pub mod signature;
pub mod sim;
pub mod stream;

pub use checksum::{ImageChecksum, md5_hex};
pub use config::{StatusLedConfig, StreamRetryPolicy, UpdateConfig};
pub use error::{ConfigError, PlatformError, UpdateError};
pub use partition::{
    Partition, PartitionSubtype, PartitionType, ResolvedTarget, TargetKind, UpdateSize,
    resolve_target,
};
pub use platform::{FlashPlatform, StatusPin};
pub use sector::HeaderGuard;
pub use session::UpdateSession;
pub use signature::SignatureGate;
pub use stream::{ByteSource, ReaderSource};
