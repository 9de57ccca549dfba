//! In-memory NOR flash device
//!
//! [`MemoryFlash`] behaves like a small partitioned SPI flash: erased bytes
//! read as `0xFF`, programming can only clear bits and every access is
//! bounds checked against its partition. It tracks the running and boot
//! slots and can be told to fail specific operations.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlatformError;
use crate::partition::{Partition, PartitionSubtype, PartitionType};
use crate::platform::{FlashPlatform, sha256_by_reading};

/// Value of an erased flash byte
pub const ERASED: u8 = 0xFF;

/// Partition table plus boot state of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLayout {
    /// Partition table
    pub partitions: Vec<Partition>,
    /// Label of the slot the device is running from
    pub running: String,
    /// Label of the slot selected for the next boot
    pub boot: String,
}

impl DeviceLayout {
    /// `nvs, otadata, ota_0, ota_1, spiffs`, running and booting `ota_0`
    pub fn standard(slot_size: u32, data_size: u32) -> Self {
        let ota_0 = 0x10000;
        let ota_1 = ota_0 + slot_size;
        let spiffs = ota_1 + slot_size;
        Self {
            partitions: vec![
                Partition::new("nvs", PartitionType::Data, PartitionSubtype::Nvs, 0x9000, 0x5000),
                Partition::new(
                    "otadata",
                    PartitionType::Data,
                    PartitionSubtype::OtaData,
                    0xE000,
                    0x2000,
                ),
                Partition::new("ota_0", PartitionType::App, PartitionSubtype::Ota(0), ota_0, slot_size),
                Partition::new("ota_1", PartitionType::App, PartitionSubtype::Ota(1), ota_1, slot_size),
                Partition::new(
                    "spiffs",
                    PartitionType::Data,
                    PartitionSubtype::Spiffs,
                    spiffs,
                    data_size,
                ),
            ],
            running: "ota_0".into(),
            boot: "ota_0".into(),
        }
    }

    /// Look up a partition by label
    pub fn partition(&self, label: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.label == label)
    }

    /// Bytes of flash needed to hold every partition
    pub fn flash_size(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.end() as usize)
            .max()
            .unwrap_or(0)
    }
}

/// Operations the device should fail
///
/// `*_after` counts the calls that still succeed before every further call
/// fails; `Some(0)` fails right away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail erases after this many successful ones
    pub erase_after: Option<usize>,
    /// Fail writes after this many successful ones
    pub write_after: Option<usize>,
    /// Fail content hashing
    pub hash: bool,
    /// Fail boot partition changes
    pub set_boot: bool,
}

/// Simulated partitioned flash
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    layout: DeviceLayout,
    data: Vec<u8>,
    faults: FaultPlan,
    erases: usize,
    writes: usize,
}

impl MemoryFlash {
    /// Fully erased device
    pub fn new(layout: DeviceLayout) -> Self {
        let data = vec![ERASED; layout.flash_size()];
        Self::with_contents(layout, data)
    }

    /// Device with existing flash contents, padded with erased bytes
    pub fn from_image(layout: DeviceLayout, mut data: Vec<u8>) -> Self {
        let size = layout.flash_size();
        if data.len() < size {
            data.resize(size, ERASED);
        }
        Self::with_contents(layout, data)
    }

    fn with_contents(layout: DeviceLayout, data: Vec<u8>) -> Self {
        Self {
            layout,
            data,
            faults: FaultPlan::default(),
            erases: 0,
            writes: 0,
        }
    }

    /// Partition table and boot state
    pub fn layout(&self) -> &DeviceLayout {
        &self.layout
    }

    /// Raw flash contents
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Contents of the partition labelled `label`
    pub fn partition_data(&self, label: &str) -> Option<&[u8]> {
        let partition = self.layout.partition(label)?;
        self.data
            .get(partition.offset as usize..partition.end() as usize)
    }

    /// Label of the slot selected for the next boot
    pub fn boot_label(&self) -> &str {
        &self.layout.boot
    }

    /// Label of the running slot
    pub fn running_label(&self) -> &str {
        &self.layout.running
    }

    /// Simulate a reset: run whatever slot is selected for boot
    pub fn reboot(&mut self) {
        info!("rebooting into {}", self.layout.boot);
        self.layout.running = self.layout.boot.clone();
    }

    /// Faults to inject
    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    /// Number of erase calls served
    pub fn erase_count(&self) -> usize {
        self.erases
    }

    /// Number of write calls served
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn span(&self, partition: &Partition, offset: u32, len: usize) -> Result<std::ops::Range<usize>, PlatformError> {
        let known = self
            .layout
            .partition(&partition.label)
            .ok_or_else(|| PlatformError::UnknownPartition(partition.label.clone()))?;

        let end = u64::from(offset) + len as u64;
        if end > u64::from(known.size) {
            return Err(PlatformError::OutOfBounds {
                offset,
                len,
                size: known.size,
            });
        }

        let start = known.offset as usize + offset as usize;
        Ok(start..start + len)
    }

    fn tripped(limit: Option<usize>, served: usize) -> bool {
        limit.is_some_and(|limit| served >= limit)
    }
}

impl FlashPlatform for MemoryFlash {
    fn read(&self, partition: &Partition, offset: u32, buf: &mut [u8]) -> Result<(), PlatformError> {
        let span = self.span(partition, offset, buf.len())?;
        buf.copy_from_slice(&self.data[span]);
        Ok(())
    }

    fn write(&mut self, partition: &Partition, offset: u32, data: &[u8]) -> Result<(), PlatformError> {
        if Self::tripped(self.faults.write_after, self.writes) {
            return Err(PlatformError::Device("injected write failure".into()));
        }
        let span = self.span(partition, offset, data.len())?;
        for (dst, src) in self.data[span].iter_mut().zip(data) {
            *dst &= *src;
        }
        self.writes += 1;
        Ok(())
    }

    fn erase_range(&mut self, partition: &Partition, offset: u32, len: u32) -> Result<(), PlatformError> {
        if Self::tripped(self.faults.erase_after, self.erases) {
            return Err(PlatformError::Device("injected erase failure".into()));
        }
        let span = self.span(partition, offset, len as usize)?;
        self.data[span].fill(ERASED);
        self.erases += 1;
        Ok(())
    }

    fn find_partition(
        &self,
        kind: PartitionType,
        subtype: PartitionSubtype,
        label: Option<&str>,
    ) -> Option<Partition> {
        self.layout
            .partitions
            .iter()
            .find(|p| {
                p.kind == kind && p.subtype == subtype && label.is_none_or(|label| p.label == label)
            })
            .cloned()
    }

    fn next_update_partition(&self) -> Option<Partition> {
        self.layout
            .partitions
            .iter()
            .find(|p| p.is_ota_slot() && p.label != self.layout.running)
            .cloned()
    }

    fn set_boot_partition(&mut self, partition: &Partition) -> Result<(), PlatformError> {
        if self.faults.set_boot {
            return Err(PlatformError::Device("injected boot switch failure".into()));
        }
        let known = self
            .layout
            .partition(&partition.label)
            .ok_or_else(|| PlatformError::UnknownPartition(partition.label.clone()))?;
        if known.kind != PartitionType::App {
            return Err(PlatformError::NotBootable(partition.label.clone()));
        }
        debug!("boot partition set to {}", partition.label);
        self.layout.boot = partition.label.clone();
        Ok(())
    }

    fn content_sha256(&self, partition: &Partition) -> Result<[u8; 32], PlatformError> {
        if self.faults.hash {
            return Err(PlatformError::Device("injected hash failure".into()));
        }
        sha256_by_reading(self, partition)
    }
}
