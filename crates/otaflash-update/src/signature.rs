//! Ed25519 signature gate over the written partition

use otaflash_crypto::{CryptoError, Ed25519Verifier, PublicKey, Signature};
use tracing::{debug, error};

use crate::error::UpdateError;
use crate::partition::Partition;
use crate::platform::FlashPlatform;

/// Verifies a partition against a base64 Ed25519 public key
#[derive(Debug, Clone, Copy)]
pub struct SignatureGate<'a> {
    key: &'a str,
}

impl<'a> SignatureGate<'a> {
    /// Gate using `key` (base64)
    pub fn new(key: &'a str) -> Self {
        Self { key }
    }

    /// Check `signature` (hex) against the SHA-256 of `partition`
    ///
    /// The partition must already hold its final content, header included.
    pub fn check<P: FlashPlatform + ?Sized>(
        &self,
        platform: &P,
        partition: &Partition,
        signature: Option<&str>,
    ) -> Result<(), UpdateError> {
        let digest = platform.content_sha256(partition).map_err(|err| {
            error!("hashing {} failed: {}", partition.label, err);
            UpdateError::HashComputationFailed
        })?;
        debug!("partition {} sha256 {}", partition.label, hex::encode(digest));

        let key = PublicKey::from_base64(self.key).map_err(|err| {
            error!("verification key rejected: {}", err);
            UpdateError::PublicKeyParseFailed
        })?;

        let Some(text) = signature else {
            error!("no signature supplied");
            return Err(UpdateError::SignatureNotValid);
        };
        let signature = Signature::from_hex(text).map_err(|err| {
            error!("signature rejected: {}", err);
            UpdateError::SignatureNotValid
        })?;

        match Ed25519Verifier::verify_digest(&digest, &signature, &key) {
            Ok(()) => {
                debug!("signature verified with key {}", key.fingerprint());
                Ok(())
            }
            Err(CryptoError::InvalidSignature) => {
                error!("signature does not match partition {}", partition.label);
                Err(UpdateError::SignatureVerificationFailed)
            }
            Err(err) => {
                error!("signature rejected: {}", err);
                Err(UpdateError::SignatureNotValid)
            }
        }
    }
}
