//! Key and image commands: keygen, digest, sign

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use otaflash_crypto::prelude::*;
use otaflash_update::md5_hex;
use otaflash_update::sim::ERASED;

use crate::error::CliError;
use crate::output;

/// Generate a key pair and store the secret half in `secret_out`
pub fn keygen(secret_out: &Path, force: bool, json: bool) -> Result<()> {
    if secret_out.exists() && !force {
        return Err(CliError::ValidationError(format!(
            "{} already exists, pass --force to replace it",
            secret_out.display()
        ))
        .into());
    }

    let keypair = KeyPair::generate();
    fs::write(secret_out, keypair.secret_hex()).map_err(CliError::from)?;
    info!("wrote secret key {}", secret_out.display());

    let public_key = keypair.public_key.to_base64();
    if json {
        output::print_success(
            "Generated key pair",
            true,
            json!({
                "public_key": public_key,
                "fingerprint": keypair.fingerprint(),
            }),
        );
    } else {
        output::print_success(
            &format!("Secret key written to {}", secret_out.display()),
            false,
            json!({}),
        );
        output::print_field("Public key", &public_key);
        output::print_field("Fingerprint", keypair.fingerprint());
    }
    Ok(())
}

/// Print the checksums a device computes for `image`
pub fn digest(image: &Path, capacity: Option<u32>, json: bool) -> Result<()> {
    let data = fs::read(image).map_err(CliError::from)?;
    let md5 = md5_hex(&data);
    let sha256 = capacity
        .map(|capacity| padded_digest(&data, capacity))
        .transpose()?
        .map(hex::encode);

    if json {
        output::print_success(
            "Computed digests",
            true,
            json!({
                "bytes": data.len(),
                "md5": md5,
                "sha256": sha256,
            }),
        );
    } else {
        output::print_field("MD5", &md5);
        if let Some(sha256) = sha256 {
            output::print_field("SHA-256", sha256);
        }
    }
    Ok(())
}

/// Sign `image` as it will sit in a partition of `capacity` bytes
pub fn sign(image: &Path, key: &Path, capacity: u32, json: bool) -> Result<()> {
    let data = fs::read(image).map_err(CliError::from)?;
    let secret = fs::read_to_string(key).map_err(CliError::from)?;
    let keypair = KeyPair::from_secret_hex(&secret).map_err(CliError::from)?;

    let digest = padded_digest(&data, capacity)?;
    let signature = Ed25519Signer::sign_digest(&digest, &keypair).to_hex();
    info!("signed {} with key {}", image.display(), keypair.fingerprint());

    if json {
        output::print_success(
            "Signed image",
            true,
            json!({
                "signature": signature,
                "sha256": hex::encode(digest),
                "public_key": keypair.public_key.to_base64(),
            }),
        );
    } else {
        println!("{}", signature);
    }
    Ok(())
}

fn padded_digest(data: &[u8], capacity: u32) -> Result<[u8; 32], CliError> {
    let capacity = capacity as usize;
    if data.len() > capacity {
        return Err(CliError::ValidationError(format!(
            "image of {} bytes does not fit a {} byte partition",
            data.len(),
            capacity
        )));
    }
    Ok(utils::partition_digest(data, capacity, ERASED))
}
