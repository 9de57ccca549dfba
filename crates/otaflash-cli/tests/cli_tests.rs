//! Integration tests for the otaflash CLI
//!
//! Every test works on its own device directory and checks both the exit
//! code and the persisted device state.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const SLOT_SIZE: usize = 0x8000;
const SPIFFS_OFFSET: usize = 0x10000 + 2 * SLOT_SIZE;

/// Custom predicate to check if output is valid JSON
fn is_json() -> impl predicates::Predicate<[u8]> {
    predicates::function::function(|s: &[u8]| {
        std::str::from_utf8(s)
            .ok()
            .is_some_and(|text| serde_json::from_str::<Value>(text).is_ok())
    })
}

fn otaflash() -> Command {
    Command::new(env!("CARGO_BIN_EXE_otaflash"))
}

fn init_device(tmp: &TempDir) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = tmp.path().join("dev");
    otaflash()
        .args(["device", "init"])
        .arg(&dir)
        .args(["--slot-size", "0x8000", "--data-size", "0x8000"])
        .assert()
        .success();
    Ok(dir)
}

fn write_image(tmp: &TempDir, name: &str, first: u8, len: usize) -> Result<PathBuf, std::io::Error> {
    let mut image: Vec<u8> = (0..len).map(|i| (i % 239) as u8).collect();
    image[0] = first;
    let path = tmp.path().join(name);
    fs::write(&path, image)?;
    Ok(path)
}

fn json_output(cmd: &mut Command) -> Result<Value, Box<dyn std::error::Error>> {
    let output = cmd.arg("--json").output()?;
    if !output.status.success() {
        return Err(format!(
            "command failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )
        .into());
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn status(dir: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    json_output(otaflash().args(["device", "status"]).arg(dir))
}

#[test]
fn test_help_lists_commands() -> TestResult {
    otaflash()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("flash"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("keygen"));
    Ok(())
}

#[test]
fn test_device_init_and_status() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;

    assert!(dir.join("device.json").is_file());
    assert_eq!(fs::metadata(dir.join("flash.bin"))?.len(), SPIFFS_OFFSET as u64 + 0x8000);

    let status = status(&dir)?;
    assert_eq!(status["boot"], "ota_0");
    assert_eq!(status["running"], "ota_0");
    assert_eq!(status["partitions"].as_array().map(Vec::len), Some(5));
    assert_eq!(status["bootable"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn test_device_init_refuses_existing() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;

    otaflash()
        .args(["device", "init"])
        .arg(&dir)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn test_missing_device() -> TestResult {
    let tmp = TempDir::new()?;
    otaflash()
        .args(["device", "status"])
        .arg(tmp.path().join("nothing"))
        .assert()
        .code(2);

    otaflash()
        .args(["--json", "rollback"])
        .arg(tmp.path().join("nothing"))
        .assert()
        .code(2)
        .stdout(is_json())
        .stdout(predicate::str::contains("device_not_found"));
    Ok(())
}

#[test]
fn test_flash_firmware_switches_boot_slot() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fw.bin", 0xE9, 10_000)?;
    let md5 = otaflash_update::md5_hex(&fs::read(&image)?);

    let result = json_output(
        otaflash()
            .arg("flash")
            .arg(&dir)
            .arg(&image)
            .args(["--md5", &md5]),
    )?;
    assert_eq!(result["success"], true);
    assert_eq!(result["bytes"], 10_000);
    assert_eq!(result["boot"], "ota_1");

    let flash = fs::read(dir.join("flash.bin"))?;
    let slot = &flash[0x10000 + SLOT_SIZE..0x10000 + SLOT_SIZE + 10_000];
    assert_eq!(slot, fs::read(&image)?.as_slice());

    let status = status(&dir)?;
    assert_eq!(status["boot"], "ota_1");
    assert_eq!(status["running"], "ota_0");
    Ok(())
}

#[test]
fn test_flash_checksum_mismatch_keeps_boot_slot() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fw.bin", 0xE9, 5_000)?;

    otaflash()
        .arg("flash")
        .arg(&dir)
        .arg(&image)
        .args(["--md5", "00000000000000000000000000000000"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("MD5 Check Failed"));

    let status = status(&dir)?;
    assert_eq!(status["boot"], "ota_0");
    assert_eq!(status["bootable"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn test_flash_rejects_bad_magic() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fw.bin", 0x00, 5_000)?;

    otaflash()
        .arg("flash")
        .arg(&dir)
        .arg(&image)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Wrong Magic Byte"));
    assert_eq!(status(&dir)?["boot"], "ota_0");
    Ok(())
}

#[test]
fn test_flash_rejects_malformed_checksum() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fw.bin", 0xE9, 100)?;

    otaflash()
        .arg("flash")
        .arg(&dir)
        .arg(&image)
        .args(["--md5", "abc"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Bad Argument"));
    Ok(())
}

#[test]
fn test_short_image_needs_allow_short() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fw.bin", 0xE9, 3_000)?;

    otaflash()
        .arg("flash")
        .arg(&dir)
        .arg(&image)
        .args(["--size", "0x2000"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Aborted"));
    assert_eq!(status(&dir)?["boot"], "ota_0");

    let result = json_output(
        otaflash()
            .arg("flash")
            .arg(&dir)
            .arg(&image)
            .args(["--size", "0x2000", "--allow-short"]),
    )?;
    assert_eq!(result["bytes"], 3_000);
    assert_eq!(result["boot"], "ota_1");
    Ok(())
}

#[test]
fn test_data_volume_update() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fs.bin", 0x00, 6_000)?;

    let result = json_output(
        otaflash()
            .arg("flash")
            .arg(&dir)
            .arg(&image)
            .args(["--data", "--label", "spiffs"]),
    )?;
    assert_eq!(result["boot"], "ota_0");

    let flash = fs::read(dir.join("flash.bin"))?;
    assert_eq!(
        &flash[SPIFFS_OFFSET..SPIFFS_OFFSET + 6_000],
        fs::read(&image)?.as_slice()
    );

    otaflash()
        .arg("flash")
        .arg(&dir)
        .arg(&image)
        .args(["--data", "--label", "storage"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Partition Could Not be Found"));
    Ok(())
}

#[test]
fn test_digest_reports_md5() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("abc.bin");
    fs::write(&path, b"abc")?;

    otaflash()
        .arg("digest")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("900150983cd24fb0d6963f7d28e17f72"));

    let result = json_output(otaflash().arg("digest").arg(&path).args(["--capacity", "3"]))?;
    assert_eq!(
        result["sha256"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    Ok(())
}

#[test]
fn test_signed_update() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let image = write_image(&tmp, "fw.bin", 0xE9, 12_345)?;
    let key = tmp.path().join("signing.key");
    let other_key = tmp.path().join("other.key");

    let keys = json_output(otaflash().arg("keygen").arg(&key))?;
    let public_key = keys["public_key"].as_str().ok_or("missing public key")?.to_string();
    json_output(otaflash().arg("keygen").arg(&other_key))?;

    let forged = json_output(
        otaflash()
            .arg("sign")
            .arg(&image)
            .arg("--key")
            .arg(&other_key)
            .args(["--capacity", "0x8000"]),
    )?;
    otaflash()
        .arg("flash")
        .arg(&dir)
        .arg(&image)
        .args(["--public-key", &public_key])
        .args(["--signature", forged["signature"].as_str().ok_or("missing signature")?])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Firmware Signature Verification Failed"));
    assert_eq!(status(&dir)?["boot"], "ota_0");
    assert_eq!(status(&dir)?["bootable"].as_array().map(Vec::len), Some(0));

    let signed = json_output(
        otaflash()
            .arg("sign")
            .arg(&image)
            .arg("--key")
            .arg(&key)
            .args(["--capacity", "0x8000"]),
    )?;
    let result = json_output(
        otaflash()
            .arg("flash")
            .arg(&dir)
            .arg(&image)
            .args(["--public-key", &public_key])
            .args(["--signature", signed["signature"].as_str().ok_or("missing signature")?]),
    )?;
    assert_eq!(result["boot"], "ota_1");
    Ok(())
}

#[test]
fn test_keygen_refuses_to_overwrite() -> TestResult {
    let tmp = TempDir::new()?;
    let key = tmp.path().join("signing.key");
    otaflash().arg("keygen").arg(&key).assert().success();
    let first = fs::read_to_string(&key)?;

    otaflash().arg("keygen").arg(&key).assert().code(4);
    assert_eq!(fs::read_to_string(&key)?, first);
    assert_eq!(first.len(), 64);
    Ok(())
}

#[test]
fn test_rollback_after_two_updates() -> TestResult {
    let tmp = TempDir::new()?;
    let dir = init_device(&tmp)?;
    let first = write_image(&tmp, "v1.bin", 0xE9, 4_000)?;
    let second = write_image(&tmp, "v2.bin", 0xE9, 7_000)?;

    otaflash().arg("flash").arg(&dir).arg(&first).assert().success();
    otaflash().args(["device", "reboot"]).arg(&dir).assert().success();
    assert_eq!(status(&dir)?["running"], "ota_1");

    let check = json_output(otaflash().arg("rollback").arg(&dir).arg("--check"))?;
    assert_eq!(check["available"], false);
    otaflash().arg("rollback").arg(&dir).assert().code(3);

    otaflash().arg("flash").arg(&dir).arg(&second).assert().success();
    otaflash().args(["device", "reboot"]).arg(&dir).assert().success();
    assert_eq!(status(&dir)?["running"], "ota_0");

    let check = json_output(otaflash().arg("rollback").arg(&dir).arg("--check"))?;
    assert_eq!(check["available"], true);
    let result = json_output(otaflash().arg("rollback").arg(&dir))?;
    assert_eq!(result["boot"], "ota_1");
    assert_eq!(status(&dir)?["boot"], "ota_1");
    Ok(())
}
