//! Unit handling
//!
//! The interpreter converts everything to millimeters as soon as a word is
//! parsed; only the G20/G21 selection itself is carried as state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// G-code length units (G20/G21 modal group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// G21
    Millimeters,
    /// G20
    Inches,
}

impl Units {
    /// Convert a value expressed in these units to millimeters
    pub fn to_mm(&self, value: f64) -> f64 {
        match self {
            Units::Millimeters => value,
            Units::Inches => value * MM_PER_INCH,
        }
    }

    /// The G word that selects this mode
    pub fn gcode(&self) -> &'static str {
        match self {
            Units::Millimeters => "G21",
            Units::Inches => "G20",
        }
    }

    /// Map a numeric G code (20/21) to a units mode
    pub fn from_code(code: u8) -> Option<Units> {
        match code {
            20 => Some(Units::Inches),
            21 => Some(Units::Millimeters),
            _ => None,
        }
    }
}

impl Default for Units {
    fn default() -> Self {
        Units::Millimeters
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Millimeters => write!(f, "mm"),
            Units::Inches => write!(f, "inch"),
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mm" | "millimeters" | "g21" => Ok(Units::Millimeters),
            "inch" | "in" | "inches" | "g20" => Ok(Units::Inches),
            _ => Err(format!("Unknown units: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inch_conversion() {
        assert_eq!(Units::Inches.to_mm(2.0), 50.8);
        assert_eq!(Units::Millimeters.to_mm(2.0), 2.0);
    }

    #[test]
    fn code_round_trip() {
        assert_eq!(Units::from_code(20), Some(Units::Inches));
        assert_eq!(Units::from_code(21), Some(Units::Millimeters));
        assert_eq!(Units::from_code(22), None);
    }
}
