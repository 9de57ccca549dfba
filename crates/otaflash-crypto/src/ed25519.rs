//! Ed25519 signatures over firmware image digests
//!
//! Images are not signed directly. The signer hashes the partition content
//! with SHA-256 and signs the 32-byte digest; the device recomputes the
//! digest from flash and verifies the signature against its compiled-in key.
//!
//! # Text forms
//!
//! - Public keys travel as standard base64 (32 raw bytes).
//! - Signatures travel as hex, two characters per byte (64 raw bytes).
//!
//! Both decoders are fallible and reject malformed input instead of
//! trusting a caller-provided length.

use crate::error::{CryptoError, CryptoResult};
use crate::utils;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use subtle::ConstantTimeEq;

/// Length of a raw Ed25519 public key
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of a raw Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 public key wrapper
#[derive(Debug, Clone, Copy)]
pub struct PublicKey {
    /// Raw public key bytes
    pub key_bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl PublicKey {
    /// Create a new public key from raw bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { key_bytes: bytes }
    }

    /// Parse a public key from its base64 text form
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyFormatError`] for invalid base64 or a byte
    /// string that is not a valid curve point, and
    /// [`CryptoError::InvalidKeyLength`] for anything but 32 bytes.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = utils::decode_base64(encoded.trim())?;
        let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(bytes.as_slice()) else {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            });
        };

        let key = Self { key_bytes };
        key.to_verifying_key()?;
        Ok(key)
    }

    /// Encode the key as base64
    pub fn to_base64(&self) -> String {
        utils::encode_base64(&self.key_bytes)
    }

    /// Get the fingerprint of this public key (SHA256 hash in hex)
    pub fn fingerprint(&self) -> String {
        utils::sha256_hex(&self.key_bytes)
    }

    /// Convert to ed25519_dalek VerifyingKey
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyFormatError`] if the bytes are not a valid point.
    pub fn to_verifying_key(&self) -> CryptoResult<VerifyingKey> {
        VerifyingKey::from_bytes(&self.key_bytes)
            .map_err(|e| CryptoError::KeyFormatError(format!("Invalid public key: {e}")))
    }

    /// Compare two public keys in constant time
    pub fn ct_eq(&self, other: &PublicKey) -> bool {
        self.key_bytes.ct_eq(&other.key_bytes).into()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Eq for PublicKey {}

/// Ed25519 signature wrapper
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Raw signature bytes
    pub signature_bytes: [u8; SIGNATURE_LENGTH],
}

impl Signature {
    /// Create a new signature from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            signature_bytes: bytes,
        }
    }

    /// Parse a signature from hex text
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureEncoding`] for empty, odd-length or
    /// non-hex text and [`CryptoError::InvalidSignatureLength`] when the
    /// decoded length is not 64 bytes.
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::SignatureEncoding(
                "empty signature".to_string(),
            ));
        }

        let bytes = hex::decode(encoded)?;
        let Ok(signature_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(bytes.as_slice()) else {
            return Err(CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            });
        };

        Ok(Self { signature_bytes })
    }

    /// Encode signature as lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.signature_bytes)
    }

    /// Convert to ed25519_dalek Signature
    pub fn to_dalek_signature(&self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.signature_bytes)
    }

    /// Compare two signatures in constant time
    pub fn ct_eq(&self, other: &Signature) -> bool {
        self.signature_bytes.ct_eq(&other.signature_bytes).into()
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other)
    }
}

impl Eq for Signature {}

/// Ed25519 key pair for signing images on the build host
#[derive(Debug)]
pub struct KeyPair {
    /// The signing (private) key
    pub signing_key: SigningKey,
    /// The public key derived from the signing key
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random Ed25519 key pair
    ///
    /// Uses the operating system's cryptographically secure random number generator.
    pub fn generate() -> Self {
        use rand::rngs::OsRng;

        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Load a key pair from raw signing key bytes
    pub fn from_bytes(signing_key_bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(signing_key_bytes))
    }

    /// Load a key pair from the hex form written by [`KeyPair::secret_hex`]
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyFormatError`] for malformed hex and
    /// [`CryptoError::InvalidKeyLength`] for anything but 32 bytes.
    pub fn from_secret_hex(encoded: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::KeyFormatError(format!("Hex decode error: {e}")))?;
        let Ok(secret) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        };
        Ok(Self::from_bytes(&secret))
    }

    /// Get the signing key bytes as hex (for secure storage)
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Get the public key fingerprint
    pub fn fingerprint(&self) -> String {
        self.public_key.fingerprint()
    }
}

/// Ed25519 signer for creating signatures
pub struct Ed25519Signer;

impl Ed25519Signer {
    /// Sign arbitrary data with a signing key
    pub fn sign(data: &[u8], signing_key: &SigningKey) -> Signature {
        Signature::from_bytes(signing_key.sign(data).to_bytes())
    }

    /// Sign a partition content digest
    pub fn sign_digest(digest: &[u8; 32], keypair: &KeyPair) -> Signature {
        Self::sign(digest, &keypair.signing_key)
    }
}

/// Ed25519 signature verifier
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    /// Verify an Ed25519 signature against data and public key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyFormatError`] if the public key is not a valid point.
    pub fn verify(data: &[u8], signature: &Signature, public_key: &PublicKey) -> CryptoResult<bool> {
        let verifying_key = public_key.to_verifying_key()?;
        let dalek_signature = signature.to_dalek_signature();

        Ok(verifying_key.verify(data, &dalek_signature).is_ok())
    }

    /// Verify a signature over a partition content digest
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] when the signature does not
    /// match, or a key error if the public key is unusable.
    pub fn verify_digest(
        digest: &[u8; 32],
        signature: &Signature,
        public_key: &PublicKey,
    ) -> CryptoResult<()> {
        if Self::verify(digest, signature, public_key)? {
            Ok(())
        } else {
            tracing::debug!(
                "Digest signature rejected for key {}",
                public_key.fingerprint()
            );
            Err(CryptoError::InvalidSignature)
        }
    }
}
