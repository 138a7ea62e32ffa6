//! GRBL `$n` settings mirror
//!
//! Each setting id has a fixed kind; the raw value text from a `$n=value`
//! response line is decoded accordingly. Bitmask settings become LSB-first
//! bool vectors so axis-indexed lookups work directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a setting's raw value text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingKind {
    Int,
    Float,
    Bool,
    /// Bitmask with at least this many decoded bits
    Mask(usize),
    Text,
}

/// Kind table for the GRBL v1.1 setting ids.
///
/// Unknown ids decode as text so a newer firmware never breaks the mirror.
pub fn setting_kind(id: u16) -> SettingKind {
    match id {
        0 | 1 | 10 | 26 | 30 | 31 => SettingKind::Int,
        11 | 12 | 24 | 25 | 27 | 100..=102 | 110..=112 | 120..=122 | 130..=132 => {
            SettingKind::Float
        }
        4 | 5 | 6 | 20 | 21 | 22 => SettingKind::Bool,
        2 | 3 | 23 => SettingKind::Mask(3),
        13 => SettingKind::Text,
        _ => SettingKind::Text,
    }
}

/// A decoded setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Mask(Vec<bool>),
    Text(String),
}

impl SettingValue {
    /// Decode `raw` according to the kind table.
    ///
    /// A value that does not parse as its declared kind falls back to text
    /// rather than being dropped.
    pub fn decode(id: u16, raw: &str) -> Self {
        let raw = raw.trim();
        match setting_kind(id) {
            SettingKind::Int => raw
                .parse::<i64>()
                .map(SettingValue::Int)
                .unwrap_or_else(|_| SettingValue::Text(raw.to_string())),
            SettingKind::Float => raw
                .parse::<f64>()
                .map(SettingValue::Float)
                .unwrap_or_else(|_| SettingValue::Text(raw.to_string())),
            SettingKind::Bool => match raw {
                "0" => SettingValue::Bool(false),
                "1" => SettingValue::Bool(true),
                _ => SettingValue::Text(raw.to_string()),
            },
            SettingKind::Mask(min_bits) => match raw.parse::<u32>() {
                Ok(bits) => SettingValue::Mask(decode_mask(bits, min_bits)),
                Err(_) => SettingValue::Text(raw.to_string()),
            },
            SettingKind::Text => SettingValue::Text(raw.to_string()),
        }
    }

    /// Equality at the precision the firmware echoes (4 decimals), so a
    /// re-dump of unchanged settings is not reported as a change.
    pub fn approx_eq(&self, other: &SettingValue) -> bool {
        match (self, other) {
            (SettingValue::Float(a), SettingValue::Float(b)) => {
                (a - b).abs() < 0.5e-4
            }
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Int(v) => write!(f, "{v}"),
            SettingValue::Float(v) => write!(f, "{v}"),
            SettingValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            SettingValue::Mask(bits) => {
                let value: u32 = bits
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| **b)
                    .map(|(i, _)| 1u32 << i)
                    .sum();
                write!(f, "{value}")
            }
            SettingValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// The outbound form of a settings write, built from the same table that
/// parses the inbound echo.
pub fn format_setting_write(id: u16, value: &SettingValue) -> String {
    format!("${id}={value}")
}

/// LSB-first bit expansion, padded with `false` up to `min_bits`.
fn decode_mask(bits: u32, min_bits: usize) -> Vec<bool> {
    let significant = (32 - bits.leading_zeros()) as usize;
    let len = significant.max(min_bits);
    (0..len).map(|i| bits & (1 << i) != 0).collect()
}

/// The settings mirror: last decoded value per id.
pub type SettingsMap = BTreeMap<u16, SettingValue>;
