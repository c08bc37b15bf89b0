use crate::error::{LaunchError, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// A numeric field as written in a source file: either a bare integer or a
/// string carrying a unit suffix (`"1G"`, `"10s"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Int(i64),
    Text(String),
}

impl Quantity {
    /// Interpret as a byte size (bare integers are bytes)
    pub fn to_bytes(&self, field: &str) -> Result<u64> {
        match self {
            Quantity::Int(n) => non_negative(*n, field),
            Quantity::Text(s) => parse_byte_size(s)
                .map_err(|e| LaunchError::config(format!("{}: {}", field, detail(e)))),
        }
    }

    /// Interpret as a duration (bare integers are milliseconds)
    pub fn to_duration(&self, field: &str) -> Result<Duration> {
        match self {
            Quantity::Int(n) => non_negative(*n, field).map(Duration::from_millis),
            Quantity::Text(s) => parse_duration(s)
                .map_err(|e| LaunchError::config(format!("{}: {}", field, detail(e)))),
        }
    }

    pub fn from_bytes(bytes: u64) -> Self {
        Quantity::Text(format_byte_size(bytes))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Quantity::Text(format_duration(duration))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Int(n) => write!(f, "{}", n),
            Quantity::Text(s) => write!(f, "{}", s),
        }
    }
}

fn non_negative(n: i64, field: &str) -> Result<u64> {
    u64::try_from(n)
        .map_err(|_| LaunchError::config(format!("{} must not be negative (got {})", field, n)))
}

fn detail(err: LaunchError) -> String {
    match err {
        LaunchError::ConfigurationError(msg) => msg,
        other => other.to_string(),
    }
}

/// Split `"512M"` into `("512", "M")`
fn split_number(input: &str) -> Result<(u64, &str)> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(LaunchError::config(format!(
            "'{}' must not be negative",
            input
        )));
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split_at);

    if digits.is_empty() {
        return Err(LaunchError::config(format!(
            "'{}' does not start with a number",
            input
        )));
    }

    let value = digits
        .parse::<u64>()
        .map_err(|e| LaunchError::config(format!("'{}' is not a valid number: {}", input, e)))?;

    Ok((value, unit.trim()))
}

/// Parse a byte quantity using binary multiples (`1K` = 1024 bytes).
///
/// Units are case-insensitive: `B`, `K`/`KB`, `M`/`MB`, `G`/`GB`, `T`/`TB`.
/// A bare number is taken as bytes.
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let (value, unit) = split_number(input)?;

    let multiplier = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => KIB,
        "M" | "MB" => MIB,
        "G" | "GB" => GIB,
        "T" | "TB" => TIB,
        other => {
            return Err(LaunchError::config(format!(
                "unknown size unit '{}' in '{}'. Use B, K, M, G or T",
                other, input
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| LaunchError::config(format!("size '{}' is too large", input)))
}

/// Parse a duration. Units: `ms`, `s`, `m`, `h`; a bare number is milliseconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let (value, unit) = split_number(input)?;

    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "ms" => 1,
        "s" => MS_PER_SECOND,
        "m" => MS_PER_MINUTE,
        "h" => MS_PER_HOUR,
        other => {
            return Err(LaunchError::config(format!(
                "unknown duration unit '{}' in '{}'. Use ms, s, m or h",
                other, input
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| LaunchError::config(format!("duration '{}' is too large", input)))
}

/// Render bytes in the largest unit that divides them exactly
pub fn format_byte_size(bytes: u64) -> String {
    for (size, suffix) in [(TIB, "T"), (GIB, "G"), (MIB, "M"), (KIB, "K")] {
        if bytes >= size && bytes % size == 0 {
            return format!("{}{}", bytes / size, suffix);
        }
    }
    format!("{}B", bytes)
}

/// Render a duration in the largest unit that divides it exactly
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis() as u64;
    for (size, suffix) in [(MS_PER_HOUR, "h"), (MS_PER_MINUTE, "m"), (MS_PER_SECOND, "s")] {
        if ms >= size && ms % size == 0 {
            return format!("{}{}", ms / size, suffix);
        }
    }
    format!("{}ms", ms)
}

/// Serialize a duration as whole milliseconds
pub fn serialize_millis<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_one_gigabyte() {
        assert_eq!(parse_byte_size("1G").unwrap(), 1_073_741_824);
    }

    #[test]
    fn test_parse_512_megabytes() {
        assert_eq!(parse_byte_size("512M").unwrap(), 536_870_912);
        assert_eq!(parse_byte_size("512mb").unwrap(), 536_870_912);
    }

    #[test]
    fn test_parse_bare_bytes() {
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert_eq!(parse_byte_size("10B").unwrap(), 10);
    }

    #[test]
    fn test_parse_invalid_size_unit() {
        assert!(matches!(
            parse_byte_size("1X"),
            Err(LaunchError::ConfigurationError(_))
        ));
        assert!(matches!(
            parse_byte_size("G"),
            Err(LaunchError::ConfigurationError(_))
        ));
        assert!(matches!(
            parse_byte_size("-1G"),
            Err(LaunchError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_parse_size_overflow() {
        assert!(parse_byte_size("99999999999T").is_err());
    }

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1600").unwrap(), Duration::from_millis(1600));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_invalid_duration() {
        assert!(parse_duration("10 days").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_format_picks_largest_exact_unit() {
        assert_eq!(format_byte_size(1_073_741_824), "1G");
        assert_eq!(format_byte_size(1536 * MIB), "1536M");
        assert_eq!(format_byte_size(1000), "1000B");
        assert_eq!(format_duration(Duration::from_millis(4000)), "4s");
        assert_eq!(format_duration(Duration::from_millis(1600)), "1600ms");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }

    #[test]
    fn test_quantity_negative_integer() {
        let q = Quantity::Int(-5);
        assert!(matches!(
            q.to_duration("kill_timeout"),
            Err(LaunchError::ConfigurationError(msg)) if msg.contains("kill_timeout")
        ));
    }

    #[test]
    fn test_quantity_error_names_field() {
        let q = Quantity::Text("1Q".to_string());
        let err = q.to_bytes("max_memory_restart").unwrap_err();
        assert!(err.to_string().contains("max_memory_restart"));
    }
}
