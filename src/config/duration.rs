//! Human-readable durations (`"500ms"`, `"30s"`, `"15m"`, `"2h"`, `"1d"`).

use crate::{Error, Result};
use std::time::Duration;

/// Parses a duration string.
///
/// A bare number is read as seconds. Units are case-insensitive.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty string, an unknown unit, or
/// a number that does not fit.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let value = input.trim().to_lowercase();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (num_str, unit) = value.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid duration: {input:?}")))?;

    let millis_per_unit: u64 = match unit.trim() {
        "ms" => 1,
        "" | "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        other => {
            return Err(Error::InvalidInput(format!(
                "unknown duration unit {other:?} in {input:?}"
            )));
        },
    };

    num.checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| Error::InvalidInput(format!("duration out of range: {input:?}")))
}

/// Formats a duration with the largest unit that represents it exactly.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = crate::duration_to_millis(duration);
    if millis == 0 {
        return "0s".to_string();
    }
    for (unit, size) in [("d", 86_400_000), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)] {
        if millis % size == 0 {
            return format!("{}{unit}", millis / size);
        }
    }
    format!("{millis}ms")
}
