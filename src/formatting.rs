// src/formatting.rs

use crate::sampler::disk::DiskStat;

/// Marker rendered in place of a value that could not be measured.
pub const UNAVAILABLE: &str = "n/a";

const BYTE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Formats a percentage with one decimal, e.g. `42.5%`.
pub fn format_percent(value: f64) -> String {
    if value.is_nan() {
        return UNAVAILABLE.to_string();
    }
    format!("{:3.1}%", value)
}

/// Formats a byte count with 1024-based units and two decimals, e.g. `1.50MB`.
pub fn format_bytes(bytes: f64) -> String {
    if bytes.is_nan() {
        return UNAVAILABLE.to_string();
    }
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, BYTE_UNITS[unit])
}

/// Formats a byte count as gigabytes, e.g. `15.54GB`.
pub fn format_gigabytes(bytes: f64) -> String {
    if bytes.is_nan() {
        return UNAVAILABLE.to_string();
    }
    format!("{:3.2}GB", bytes / 1024.0 / 1024.0 / 1024.0)
}

/// Formats a byte count as megabytes, e.g. `160.2MB`.
pub fn format_megabytes(bytes: f64) -> String {
    if bytes.is_nan() {
        return UNAVAILABLE.to_string();
    }
    format!("{:3.1}MB", bytes / 1024.0 / 1024.0)
}

/// Cuts `s` down to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Renders ranked disks as `[sda:12.5%,sdb:0.3%,]`.
pub fn format_disk_usage(disks: &[DiskStat]) -> String {
    let entries: String = disks
        .iter()
        .map(|disk| format!("{}:{},", disk.name, format_percent(disk.usage)))
        .collect();
    format!("[{}]", entries).replace(' ', "")
}
