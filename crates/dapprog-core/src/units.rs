//! Number and size parsing for description and configuration files
//!
//! Addresses may be written as TOML integers or as strings in hex
//! (`"0x0800_0000"`) or decimal. Sizes additionally accept a `B`, `KiB`
//! or `MiB` suffix (`"16 KiB"`).

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(u32),
    Str(String),
}

/// Parse a number that can be hex (0x...) or decimal, with `_` separators
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim().replace('_', "");
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex number '{}': {}", s, e))
    } else {
        s.parse()
            .map_err(|e| format!("invalid number '{}': {}", s, e))
    }
}

/// Parse a size string like "16 KiB", "0x4000" or "4096"
pub fn parse_size(s: &str) -> Result<u32, String> {
    let lower = s.trim().to_lowercase();

    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n, 1024)
    } else if let Some(n) = lower.strip_suffix('b').filter(|_| !lower.starts_with("0x")) {
        (n, 1)
    } else {
        (lower.as_str(), 1)
    };

    parse_number(num)?
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' does not fit in 32 bits", s))
}

/// Deserialize a u32 that can be hex (0x...) or decimal
pub fn deserialize_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(n) => Ok(n),
        NumberOrString::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Deserialize an optional u32 that can be hex (0x...) or decimal
pub fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_number(deserializer).map(Some)
}

/// Deserialize a size with an optional unit suffix
pub fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(n) => Ok(n),
        NumberOrString::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
