//! Sector buffering and the bootability guard
//!
//! Bytes are collected into a sector sized buffer and programmed one sector
//! at a time: erase, then write. For executable images the first flush
//! keeps the header block back in RAM and programs the sector from just past
//! it, so the partition start stays erased (and therefore not bootable)
//! until the session commits and writes the withheld block.

use tracing::{debug, error, trace, warn};

use crate::checksum::ImageChecksum;
use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::partition::{Partition, ResolvedTarget};
use crate::platform::FlashPlatform;

/// Header check applied to the first sector of an executable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderGuard {
    /// Required first byte
    pub magic: u8,
    /// Bytes withheld until commit
    pub block_size: usize,
}

impl From<&UpdateConfig> for HeaderGuard {
    fn from(config: &UpdateConfig) -> Self {
        Self {
            magic: config.image_magic,
            block_size: config.header_block_size,
        }
    }
}

/// Write-side buffer of one update session
#[derive(Debug)]
pub struct SectorBuffer {
    data: Vec<u8>,
    sector_size: usize,
    guard: Option<HeaderGuard>,
    withheld: Option<Vec<u8>>,
    written: u32,
}

impl SectorBuffer {
    /// Empty buffer for sectors of `sector_size` bytes
    pub fn new(sector_size: usize, guard: Option<HeaderGuard>) -> Self {
        Self {
            data: Vec::with_capacity(sector_size),
            sector_size,
            guard,
            withheld: None,
            written: 0,
        }
    }

    /// Buffered bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Room left in the current sector
    pub fn free(&self) -> usize {
        self.sector_size - self.data.len()
    }

    /// Whether the current sector is complete
    pub fn is_full(&self) -> bool {
        self.data.len() == self.sector_size
    }

    /// Bytes flushed to flash so far
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Header block kept back from the first flush
    pub fn withheld(&self) -> Option<&[u8]> {
        self.withheld.as_deref()
    }

    /// Buffer as much of `data` as fits; returns the bytes taken
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.free());
        self.data.extend_from_slice(&data[..take]);
        take
    }

    /// Program the buffered bytes as the next sector
    ///
    /// No-op when the buffer is empty. On success the bytes are added to
    /// `checksum`, the written count advances and the buffer is cleared.
    /// `progress` sees `(0, total)` before the first sector and the new
    /// written count after every sector.
    pub fn flush<P: FlashPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        target: &ResolvedTarget,
        checksum: &mut ImageChecksum,
        total: u32,
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<(), UpdateError> {
        if self.data.is_empty() {
            return Ok(());
        }

        let first = self.written == 0;
        let mut skip = 0;
        if first && let Some(guard) = self.guard {
            if self.data[0] != guard.magic {
                warn!(
                    "image starts with {:#04x}, expected {:#04x}",
                    self.data[0], guard.magic
                );
                return Err(UpdateError::BadMagicByte);
            }
            skip = guard.block_size.min(self.data.len());
            self.withheld = Some(self.data[..skip].to_vec());
            trace!("withholding {} header bytes", skip);
        }

        if first {
            progress(0, total);
        }

        let partition = &target.partition;
        let offset = target.base_offset + self.written;
        let erase_len = (self.sector_size as u32).min(partition.size.saturating_sub(offset));
        platform
            .erase_range(partition, offset, erase_len)
            .map_err(|err| {
                error!("erase of {} at {:#x} failed: {}", partition.label, offset, err);
                UpdateError::FlashEraseFailed
            })?;

        if skip < self.data.len() {
            platform
                .write(partition, offset + skip as u32, &self.data[skip..])
                .map_err(|err| {
                    error!("write to {} at {:#x} failed: {}", partition.label, offset, err);
                    UpdateError::FlashWriteFailed
                })?;
        }

        checksum.update(&self.data);
        self.written += self.data.len() as u32;
        debug!("flushed {} bytes, {}/{}", self.data.len(), self.written, total);
        self.data.clear();

        progress(self.written, total);
        Ok(())
    }
}

/// Whether `partition` starts with a readable image header
pub fn is_bootable<P: FlashPlatform + ?Sized>(
    platform: &P,
    partition: &Partition,
    guard: HeaderGuard,
) -> bool {
    let mut header = vec![0u8; guard.block_size];
    match platform.read(partition, 0, &mut header) {
        Ok(()) => header.first() == Some(&guard.magic),
        Err(err) => {
            warn!("reading header of {} failed: {}", partition.label, err);
            false
        }
    }
}
