//! Images, keys and simulated devices for tests.

use otaflash_crypto::{Ed25519Signer, KeyPair, utils};
use otaflash_update::config::{IMAGE_MAGIC, StreamRetryPolicy, UpdateConfig};
use otaflash_update::sim::{DeviceLayout, ERASED, MemoryFlash};

/// Size of each OTA slot and of the data partition on [`small_device`]
pub const SLOT_SIZE: u32 = 0x4000;

/// Seed of [`test_keypair`]
pub const TEST_KEY_SEED: [u8; 32] = [0x5A; 32];

/// Executable image of `len` bytes starting with the image magic
pub fn firmware_image(len: usize) -> Vec<u8> {
    let mut image = pattern(len, 31);
    if let Some(first) = image.first_mut() {
        *first = IMAGE_MAGIC;
    }
    image
}

/// Filesystem image of `len` bytes that does not start with the magic
pub fn data_image(len: usize) -> Vec<u8> {
    let mut image = pattern(len, 17);
    if let Some(first) = image.first_mut() {
        *first = 0x00;
    }
    image
}

fn pattern(len: usize, step: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * step + i / 251) % 256) as u8).collect()
}

/// Device with `nvs, otadata, ota_0, ota_1, spiffs`, each slot [`SLOT_SIZE`]
pub fn small_device() -> MemoryFlash {
    MemoryFlash::new(DeviceLayout::standard(SLOT_SIZE, SLOT_SIZE))
}

/// Configuration without a verification key and with a short retry budget
pub fn test_config() -> UpdateConfig {
    UpdateConfig::default()
        .with_verification_key(None)
        .with_stream_retry(StreamRetryPolicy {
            max_attempts: 3,
            interval_ms: 1,
        })
}

/// [`test_config`] verifying signatures against `keypair`
pub fn signing_config(keypair: &KeyPair) -> UpdateConfig {
    test_config().with_verification_key(Some(keypair.public_key.to_base64()))
}

/// Deterministic signing key
pub fn test_keypair() -> KeyPair {
    KeyPair::from_bytes(&TEST_KEY_SEED)
}

/// Hex signature of a slot of `capacity` bytes holding `image`
pub fn sign_for_partition(keypair: &KeyPair, image: &[u8], capacity: u32) -> String {
    let digest = utils::partition_digest(image, capacity as usize, ERASED);
    Ed25519Signer::sign_digest(&digest, keypair).to_hex()
}
