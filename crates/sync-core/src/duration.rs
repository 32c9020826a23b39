//! Duration parsing utilities.

use std::time::Duration;

use crate::error::{Result, SyncError};

/// Parse a duration string like "250ms", "10s", "5m", "1h" or "300".
///
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Milliseconds suffix: "250ms"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SyncError::config("Empty duration string"));
    }

    // "ms" must be checked before "m" and "s"
    if let Some(num_str) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse_number(num_str, "milliseconds")?));
    }
    if let Some(num_str) = s.strip_suffix('h') {
        return scaled_secs(parse_number(num_str, "hours")?, 3600, s);
    }
    if let Some(num_str) = s.strip_suffix('m') {
        return scaled_secs(parse_number(num_str, "minutes")?, 60, s);
    }
    if let Some(num_str) = s.strip_suffix('s') {
        return Ok(Duration::from_secs(parse_number(num_str, "seconds")?));
    }

    // No suffix - treat as seconds
    Ok(Duration::from_secs(parse_number(s, "duration")?))
}

fn scaled_secs(value: u64, factor: u64, original: &str) -> Result<Duration> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| SyncError::config(format!("Duration '{original}' is too large")))
}

fn parse_number(num_str: &str, unit: &str) -> Result<u64> {
    num_str
        .trim()
        .parse::<u64>()
        .map_err(|e| SyncError::config(format!("Invalid {unit} value '{num_str}': {e}")))
}
