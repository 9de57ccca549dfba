//! Error types for update sessions
//!
//! [`UpdateError`] is the closed set of failure kinds a session can report.
//! Every failure of an active session tears the session down and leaves the
//! kind behind as the sticky last error, readable through
//! [`crate::UpdateSession::last_error`] until the next successful `begin`.
//! The only exceptions are [`UpdateError::AlreadyRunning`] and
//! [`UpdateError::NotRunning`], which describe a misuse of the call sequence
//! and are returned without touching the session.

use core::fmt;

use thiserror::Error;

/// Diagnostic string reported while no error is recorded
pub const NO_ERROR: &str = "No Error";

/// Failure kinds of an update session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UpdateError {
    /// Writing a sector to flash failed
    FlashWriteFailed = 1,
    /// Erasing a sector failed
    FlashEraseFailed = 2,
    /// Reading back the activated header failed
    FlashReadFailed = 3,
    /// A write would exceed the declared image size
    NotEnoughSpace = 4,
    /// Declared size is zero or larger than the target partition
    BadSize = 5,
    /// The byte source stalled past the retry budget
    StreamTimeout = 6,
    /// The image digest does not match the expected checksum
    ChecksumMismatch = 7,
    /// The image does not start with the executable image magic byte
    BadMagicByte = 8,
    /// Switching the boot partition failed
    ActivationFailed = 9,
    /// No partition matches the requested target
    NoPartition = 10,
    /// Unknown target kind or malformed argument
    BadArgument = 11,
    /// Session aborted by the caller or ended before completion
    Abort = 12,
    /// Computing the partition content hash failed
    HashComputationFailed = 13,
    /// The configured verification key could not be parsed
    PublicKeyParseFailed = 14,
    /// The supplied signature is missing or malformed
    SignatureNotValid = 15,
    /// The signature does not match the partition content
    SignatureVerificationFailed = 16,
    /// `begin` called while a session is active
    AlreadyRunning = 100,
    /// Operation requires an active session
    NotRunning = 101,
}

impl UpdateError {
    /// Fixed human-readable description, for diagnostics only
    pub const fn as_str(self) -> &'static str {
        match self {
            UpdateError::FlashWriteFailed => "Flash Write Failed",
            UpdateError::FlashEraseFailed => "Flash Erase Failed",
            UpdateError::FlashReadFailed => "Flash Read Failed",
            UpdateError::NotEnoughSpace => "Not Enough Space",
            UpdateError::BadSize => "Bad Size Given",
            UpdateError::StreamTimeout => "Stream Read Timeout",
            UpdateError::ChecksumMismatch => "MD5 Check Failed",
            UpdateError::BadMagicByte => "Wrong Magic Byte",
            UpdateError::ActivationFailed => "Could Not Activate The Firmware",
            UpdateError::NoPartition => "Partition Could Not be Found",
            UpdateError::BadArgument => "Bad Argument",
            UpdateError::Abort => "Aborted",
            UpdateError::HashComputationFailed => "Get SHA-256 Failed",
            UpdateError::PublicKeyParseFailed => "Parse Public Key Failed",
            UpdateError::SignatureNotValid => "Signature Not Valid",
            UpdateError::SignatureVerificationFailed => "Firmware Signature Verification Failed",
            UpdateError::AlreadyRunning => "Update Already Running",
            UpdateError::NotRunning => "No Update Running",
        }
    }

    /// Numeric error code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Whether this kind is stored as the sticky session error
    pub const fn is_sticky(self) -> bool {
        !matches!(self, UpdateError::AlreadyRunning | UpdateError::NotRunning)
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for UpdateError {}

/// Failures reported by the platform flash primitives
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Access outside the partition bounds
    #[error("Access out of bounds: offset {offset:#x} + {len} exceeds partition size {size:#x}")]
    OutOfBounds {
        /// Offset relative to the partition start
        offset: u32,
        /// Length of the access
        len: usize,
        /// Partition size
        size: u32,
    },

    /// Partition label is not in the partition table
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Partition cannot be selected for boot
    #[error("Partition is not bootable: {0}")]
    NotBootable(String),

    /// Device reported a failure
    #[error("Device error: {0}")]
    Device(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading or validating an [`crate::UpdateConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration text could not be parsed
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration values are inconsistent
    #[error("Invalid configuration value: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(UpdateError::FlashWriteFailed.code(), 1);
        assert_eq!(UpdateError::Abort.code(), 12);
        assert_eq!(UpdateError::SignatureVerificationFailed.code(), 16);
    }

    #[test]
    fn test_display_uses_table() {
        assert_eq!(UpdateError::BadMagicByte.to_string(), "Wrong Magic Byte");
        assert_eq!(
            format!("{}", UpdateError::NoPartition),
            UpdateError::NoPartition.as_str()
        );
    }

    #[test]
    fn test_call_misuse_is_not_sticky() {
        assert!(!UpdateError::AlreadyRunning.is_sticky());
        assert!(!UpdateError::NotRunning.is_sticky());
        assert!(UpdateError::Abort.is_sticky());
        assert!(UpdateError::StreamTimeout.is_sticky());
    }

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::OutOfBounds {
            offset: 0x1000,
            len: 16,
            size: 0x1000,
        };
        assert_eq!(
            err.to_string(),
            "Access out of bounds: offset 0x1000 + 16 exceeds partition size 0x1000"
        );
    }
}
