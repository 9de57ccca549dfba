//! Output formatting for CLI responses

use anyhow::Error;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

use otaflash_update::Partition;
use otaflash_update::sim::DeviceLayout;

use crate::error::CliError;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "type": error_type_name(error)
        }
    });
    print_json(&error_json);
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print a success message, optionally with structured fields
pub fn print_success(message: &str, json: bool, fields: Value) {
    if json {
        let mut output = json!({
            "success": true,
            "message": message,
        });
        if let (Some(output), Value::Object(fields)) = (output.as_object_mut(), fields) {
            output.extend(fields);
        }
        print_json(&output);
    } else {
        println!("{} {}", "✓".green(), message);
    }
}

/// Print a labelled value in human format
pub fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", name.bold(), value);
}

/// Print partition table and boot state
pub fn print_device_status(layout: &DeviceLayout, bootable: &[(String, bool)], json: bool) {
    if json {
        let output = json!({
            "success": true,
            "running": layout.running,
            "boot": layout.boot,
            "partitions": layout.partitions,
            "bootable": bootable
                .iter()
                .filter(|(_, ok)| *ok)
                .map(|(label, _)| label)
                .collect::<Vec<_>>(),
        });
        print_json(&output);
        return;
    }

    println!("{}", "Partitions:".bold());
    for partition in &layout.partitions {
        print_partition_human(partition, layout, bootable);
    }
    print_field("Running", &layout.running);
    print_field("Boot", &layout.boot);
}

fn print_partition_human(partition: &Partition, layout: &DeviceLayout, bootable: &[(String, bool)]) {
    let marker = if partition.label == layout.boot {
        "●".green()
    } else if bootable.iter().any(|(label, ok)| *ok && *label == partition.label) {
        "●".yellow()
    } else {
        "○".dimmed()
    };
    println!(
        "  {} {:<10} {:>#9x} {:>#9x}  {:?}/{:?}",
        marker,
        partition.label.bold(),
        partition.offset,
        partition.size,
        partition.kind,
        partition.subtype
    );
}

/// Progress bar for an image transfer of `total` bytes
pub fn transfer_bar(total: u32) -> ProgressBar {
    let bar = ProgressBar::new(u64::from(total));
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{bar:40}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format output as JSON: {}", e),
    }
}

fn error_type_name(error: &Error) -> &'static str {
    match error.downcast_ref::<CliError>() {
        Some(CliError::DeviceNotFound(_)) => "device_not_found",
        Some(CliError::DeviceExists(_)) => "device_exists",
        Some(CliError::UpdateFailed(_)) => "update_failed",
        Some(CliError::RollbackUnavailable) => "rollback_unavailable",
        Some(CliError::ValidationError(_)) => "validation_error",
        Some(CliError::InvalidConfiguration(_)) => "invalid_configuration",
        Some(CliError::KeyError(_)) => "key_error",
        Some(CliError::IoError(_)) => "io_error",
        Some(CliError::JsonError(_)) => "json_error",
        None => "unknown",
    }
}
