//! Error types for signature operations

use thiserror::Error;

/// Signature and key handling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Public key text could not be decoded or is not a valid curve point
    #[error("Key format error: {0}")]
    KeyFormatError(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Signature text is not well-formed hex
    #[error("Signature encoding error: {0}")]
    SignatureEncoding(String),

    /// Invalid signature length
    #[error("Invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidSignatureLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Signature does not match the digest under the given key
    #[error("Invalid signature")]
    InvalidSignature,
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::KeyFormatError(format!("Base64 decode error: {e}"))
    }
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::SignatureEncoding(e.to_string())
    }
}

/// Result type for signature operations
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::InvalidSignature;
        assert_eq!(err.to_string(), "Invalid signature");

        let err = CryptoError::InvalidKeyLength {
            expected: 32,
            actual: 16,
        };
        assert!(err.to_string().contains("32"));
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_error_from_hex() {
        let result = hex::decode("abc").map_err(CryptoError::from);
        assert!(matches!(result, Err(CryptoError::SignatureEncoding(_))));
    }

    #[test]
    fn test_error_from_base64() {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        let result = STANDARD.decode("***").map_err(CryptoError::from);
        assert!(matches!(result, Err(CryptoError::KeyFormatError(_))));
    }
}
