//! Rolling MD5 over the image as it is flushed

use md5::{Digest, Md5};

use crate::error::UpdateError;

/// Length of an expected checksum in hex characters
pub const CHECKSUM_HEX_LEN: usize = 32;

/// Incremental image digest
#[derive(Debug, Clone, Default)]
pub struct ImageChecksum {
    hasher: Md5,
    bytes: u64,
}

impl ImageChecksum {
    /// Start an empty digest
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next bytes of the image
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes fed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex digest of everything fed so far; restarts the digest
    pub fn finalize_hex(&mut self) -> String {
        self.bytes = 0;
        hex::encode(self.hasher.finalize_reset())
    }
}

/// Lowercase hex MD5 of `data`
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Check the shape of a caller supplied checksum
pub fn validate_expected(text: &str) -> Result<(), UpdateError> {
    if text.len() == CHECKSUM_HEX_LEN && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(UpdateError::BadArgument)
    }
}
