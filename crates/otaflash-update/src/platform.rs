//! Capabilities the host platform provides to an update session

use sha2::{Digest, Sha256};

use crate::error::PlatformError;
use crate::partition::{Partition, PartitionSubtype, PartitionType};

/// Chunk size used when hashing a partition by reading it back
const HASH_CHUNK: usize = 4096;

/// Partition level flash access, discovery and boot control
///
/// Offsets are relative to the start of the partition. Implementations
/// must reject accesses that cross the partition end.
pub trait FlashPlatform {
    /// Read `buf.len()` bytes at `offset`
    fn read(&self, partition: &Partition, offset: u32, buf: &mut [u8])
    -> Result<(), PlatformError>;

    /// Program `data` at `offset`; the range must have been erased
    fn write(&mut self, partition: &Partition, offset: u32, data: &[u8])
    -> Result<(), PlatformError>;

    /// Erase `len` bytes at `offset`
    fn erase_range(&mut self, partition: &Partition, offset: u32, len: u32)
    -> Result<(), PlatformError>;

    /// First partition matching type, subtype and, when given, label
    fn find_partition(
        &self,
        kind: PartitionType,
        subtype: PartitionSubtype,
        label: Option<&str>,
    ) -> Option<Partition>;

    /// OTA slot that should receive the next firmware image
    fn next_update_partition(&self) -> Option<Partition>;

    /// Boot from `partition` on next reset
    fn set_boot_partition(&mut self, partition: &Partition) -> Result<(), PlatformError>;

    /// SHA-256 over the whole partition
    fn content_sha256(&self, partition: &Partition) -> Result<[u8; 32], PlatformError> {
        sha256_by_reading(self, partition)
    }
}

/// Hash a partition by reading it back in chunks
pub fn sha256_by_reading<P: FlashPlatform + ?Sized>(
    platform: &P,
    partition: &Partition,
) -> Result<[u8; 32], PlatformError> {
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; HASH_CHUNK];
    let mut offset = 0u32;

    while offset < partition.size {
        let len = (partition.size - offset).min(HASH_CHUNK as u32) as usize;
        platform.read(partition, offset, &mut chunk[..len])?;
        hasher.update(&chunk[..len]);
        offset += len as u32;
    }

    Ok(hasher.finalize().into())
}

/// Digital output used as an activity indicator
pub trait StatusPin: Send {
    /// Configure `pin` as an output
    fn configure_output(&mut self, pin: i32);

    /// Drive `pin` high or low
    fn set_level(&mut self, pin: i32, high: bool);
}
