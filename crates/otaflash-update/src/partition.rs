//! Partition model and update target resolution

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::platform::FlashPlatform;

/// Top-level partition type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionType {
    /// Executable image
    App,
    /// Data region
    Data,
}

/// Partition subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSubtype {
    /// Factory image
    Factory,
    /// Numbered OTA slot
    Ota(u8),
    /// OTA selection data
    OtaData,
    /// Non-volatile key/value storage
    Nvs,
    /// SPIFFS filesystem volume
    Spiffs,
    /// FAT filesystem volume
    Fat,
}

/// A named, contiguous region of flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition label
    pub label: String,
    /// Partition type
    pub kind: PartitionType,
    /// Partition subtype
    pub subtype: PartitionSubtype,
    /// Absolute flash offset
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

impl Partition {
    /// Create a partition entry
    pub fn new(
        label: impl Into<String>,
        kind: PartitionType,
        subtype: PartitionSubtype,
        offset: u32,
        size: u32,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            subtype,
            offset,
            size,
        }
    }

    /// Whether this partition is an OTA slot that can receive an image
    pub fn is_ota_slot(&self) -> bool {
        self.kind == PartitionType::App && matches!(self.subtype, PartitionSubtype::Ota(_))
    }

    /// Absolute end offset
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {:#x} ({} bytes)", self.label, self.offset, self.size)
    }
}

/// What kind of image an update session receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// Executable image for the next OTA slot
    Firmware,
    /// Filesystem image for a data partition
    DataVolume {
        /// Label of the SPIFFS partition, first match if `None`
        label: Option<String>,
    },
}

impl TargetKind {
    /// Numeric command code of a firmware update
    pub const FIRMWARE_COMMAND: i32 = 0;
    /// Numeric command code of a data volume update
    pub const DATA_VOLUME_COMMAND: i32 = 100;

    /// Map a numeric command code to a target
    pub fn from_command(code: i32, label: Option<&str>) -> Result<Self, UpdateError> {
        match code {
            Self::FIRMWARE_COMMAND => Ok(TargetKind::Firmware),
            Self::DATA_VOLUME_COMMAND => Ok(TargetKind::DataVolume {
                label: label.map(str::to_owned),
            }),
            other => {
                error!("bad command {}", other);
                Err(UpdateError::BadArgument)
            }
        }
    }

    /// Data volume target with an explicit label
    pub fn data_volume(label: impl Into<String>) -> Self {
        TargetKind::DataVolume {
            label: Some(label.into()),
        }
    }

    /// Whether images of this kind must be bootable
    pub fn is_firmware(&self) -> bool {
        matches!(self, TargetKind::Firmware)
    }
}

/// Declared image size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSize {
    /// Exact byte count
    Known(u32),
    /// Fill up to the target capacity
    Unknown,
}

impl UpdateSize {
    /// Numeric form of [`UpdateSize::Unknown`]
    pub const UNKNOWN: u32 = u32::MAX;
}

impl From<u32> for UpdateSize {
    fn from(value: u32) -> Self {
        if value == Self::UNKNOWN {
            UpdateSize::Unknown
        } else {
            UpdateSize::Known(value)
        }
    }
}

/// Partition chosen to receive an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Destination partition
    pub partition: Partition,
    /// Offset of the image inside the partition
    pub base_offset: u32,
    /// Bytes available to the image
    pub capacity: u32,
}

impl ResolvedTarget {
    fn whole(partition: Partition) -> Self {
        Self {
            capacity: partition.size,
            partition,
            base_offset: 0,
        }
    }
}

/// Pick the destination partition for `target`
///
/// Firmware goes to the next OTA slot. Data volumes go to the SPIFFS
/// partition matching the label, falling back to the first FAT partition
/// whose leading `fat_reserved_offset` bytes are left untouched.
pub fn resolve_target<P: FlashPlatform + ?Sized>(
    platform: &P,
    target: &TargetKind,
    config: &UpdateConfig,
) -> Result<ResolvedTarget, UpdateError> {
    match target {
        TargetKind::Firmware => {
            let Some(partition) = platform.next_update_partition() else {
                warn!("no OTA slot available");
                return Err(UpdateError::NoPartition);
            };
            debug!("OTA Partition: {}", partition.label);
            Ok(ResolvedTarget::whole(partition))
        }
        TargetKind::DataVolume { label } => {
            if let Some(partition) = platform.find_partition(
                PartitionType::Data,
                PartitionSubtype::Spiffs,
                label.as_deref(),
            ) {
                debug!("data partition: {}", partition.label);
                return Ok(ResolvedTarget::whole(partition));
            }

            let Some(partition) =
                platform.find_partition(PartitionType::Data, PartitionSubtype::Fat, None)
            else {
                warn!("no data partition matches {:?}", label);
                return Err(UpdateError::NoPartition);
            };
            debug!(
                "falling back to FAT partition {} at offset {:#x}",
                partition.label, config.fat_reserved_offset
            );
            Ok(ResolvedTarget {
                capacity: partition.size.saturating_sub(config.fat_reserved_offset),
                base_offset: config.fat_reserved_offset.min(partition.size),
                partition,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{DeviceLayout, MemoryFlash};

    fn device() -> MemoryFlash {
        MemoryFlash::new(DeviceLayout::standard(0x4000, 0x4000))
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(TargetKind::from_command(0, None), Ok(TargetKind::Firmware));
        assert_eq!(
            TargetKind::from_command(100, Some("storage")),
            Ok(TargetKind::data_volume("storage"))
        );
        assert_eq!(
            TargetKind::from_command(7, None),
            Err(UpdateError::BadArgument)
        );
    }

    #[test]
    fn test_unknown_size_sentinel() {
        assert_eq!(UpdateSize::from(u32::MAX), UpdateSize::Unknown);
        assert_eq!(UpdateSize::from(1024), UpdateSize::Known(1024));
    }

    #[test]
    fn test_firmware_targets_idle_slot() -> Result<(), UpdateError> {
        let flash = device();
        let target = resolve_target(&flash, &TargetKind::Firmware, &UpdateConfig::default())?;
        assert_eq!(target.partition.label, "ota_1");
        assert_eq!(target.base_offset, 0);
        assert_eq!(target.capacity, 0x4000);
        Ok(())
    }

    #[test]
    fn test_spiffs_label_match() -> Result<(), UpdateError> {
        let flash = device();
        let target = resolve_target(
            &flash,
            &TargetKind::data_volume("spiffs"),
            &UpdateConfig::default(),
        )?;
        assert_eq!(target.partition.subtype, PartitionSubtype::Spiffs);
        assert_eq!(target.base_offset, 0);
        Ok(())
    }

    #[test]
    fn test_fat_fallback_reserves_prefix() -> Result<(), UpdateError> {
        let mut layout = DeviceLayout::standard(0x4000, 0x4000);
        layout.partitions.retain(|p| p.subtype != PartitionSubtype::Spiffs);
        layout.partitions.push(Partition::new(
            "ffat",
            PartitionType::Data,
            PartitionSubtype::Fat,
            0x40000,
            0x8000,
        ));
        let flash = MemoryFlash::new(layout);

        let target = resolve_target(
            &flash,
            &TargetKind::DataVolume { label: None },
            &UpdateConfig::default(),
        )?;
        assert_eq!(target.partition.label, "ffat");
        assert_eq!(target.base_offset, 0x1000);
        assert_eq!(target.capacity, 0x7000);
        Ok(())
    }

    #[test]
    fn test_missing_data_partition() {
        let mut layout = DeviceLayout::standard(0x4000, 0x4000);
        layout.partitions.retain(|p| p.kind != PartitionType::Data);
        let flash = MemoryFlash::new(layout);

        let result = resolve_target(
            &flash,
            &TargetKind::data_volume("spiffs"),
            &UpdateConfig::default(),
        );
        assert_eq!(result, Err(UpdateError::NoPartition));
    }
}
