//! Signature primitives for otaflash image verification
//!
//! This crate provides the cryptographic half of the update commit gate:
//! - SHA-256 content digests of partition images
//! - Ed25519 verification of a digest against a compiled-in public key
//! - Key generation and digest signing for host-side tooling
//!
//! # Architecture
//!
//! - [`ed25519`]: Key, signature, signer and verifier types
//! - [`utils`]: Digest and text-encoding helpers
//! - [`error`]: Error types for cryptographic operations
//!
//! # Example
//!
//! ```
//! use otaflash_crypto::prelude::*;
//!
//! let keypair = KeyPair::generate();
//! let digest = utils::partition_digest(b"\xE9image", 4096, 0xFF);
//!
//! let signature = Ed25519Signer::sign_digest(&digest, &keypair);
//! let key = PublicKey::from_base64(&keypair.public_key.to_base64())?;
//! let signature = Signature::from_hex(&signature.to_hex())?;
//! Ed25519Verifier::verify_digest(&digest, &signature, &key)?;
//! # Ok::<(), otaflash_crypto::CryptoError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod ed25519;
pub mod error;
pub mod prelude;

pub use ed25519::{
    Ed25519Signer, Ed25519Verifier, KeyPair, PUBLIC_KEY_LENGTH, PublicKey, SIGNATURE_LENGTH,
    Signature,
};
pub use error::{CryptoError, CryptoResult};

/// Utility functions for digests and text encodings
pub mod utils {
    use crate::error::CryptoError;
    use sha2::{Digest, Sha256};

    /// Width of a SHA-256 digest in bytes
    pub const DIGEST_LENGTH: usize = 32;

    /// Compute SHA256 hash of data
    pub fn sha256(data: &[u8]) -> [u8; DIGEST_LENGTH] {
        Sha256::digest(data).into()
    }

    /// Compute SHA256 hash of data and return as hex string
    pub fn sha256_hex(data: &[u8]) -> String {
        hex::encode(sha256(data))
    }

    /// Digest of a partition holding `image` followed by erased flash
    ///
    /// This is what a device computes over the whole partition after writing
    /// `image` into a freshly erased slot of `capacity` bytes, so host tools
    /// can sign an image without materialising the padded partition.
    pub fn partition_digest(image: &[u8], capacity: usize, erased: u8) -> [u8; DIGEST_LENGTH] {
        let mut hasher = Sha256::new();
        hasher.update(image);

        let fill = [erased; 256];
        let mut remaining = capacity.saturating_sub(image.len());
        while remaining > 0 {
            let step = remaining.min(fill.len());
            hasher.update(&fill[..step]);
            remaining -= step;
        }

        hasher.finalize().into()
    }

    /// Encode bytes as base64 (Standard alphabet with padding)
    pub fn encode_base64(data: &[u8]) -> String {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        STANDARD.encode(data)
    }

    /// Decode base64 to bytes
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyFormatError`] for invalid base64.
    pub fn decode_base64(data: &str) -> Result<Vec<u8>, CryptoError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        STANDARD.decode(data).map_err(CryptoError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::utils;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            utils::sha256_hex(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_partition_digest_matches_padded_buffer() {
        let image = [0xE9u8, 1, 2, 3, 4];
        let mut padded = vec![0xFFu8; 1000];
        padded[..image.len()].copy_from_slice(&image);

        assert_eq!(
            utils::partition_digest(&image, 1000, 0xFF),
            utils::sha256(&padded)
        );
    }

    #[test]
    fn test_partition_digest_without_padding() {
        let image = [1u8; 64];
        assert_eq!(utils::partition_digest(&image, 64, 0xFF), utils::sha256(&image));
        assert_eq!(utils::partition_digest(&image, 10, 0xFF), utils::sha256(&image));
    }

    #[test]
    fn test_base64_roundtrip() -> Result<(), crate::CryptoError> {
        let data = [0u8, 1, 2, 250, 251, 252];
        let decoded = utils::decode_base64(&utils::encode_base64(&data))?;
        assert_eq!(decoded, data);
        Ok(())
    }
}
