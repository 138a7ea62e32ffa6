//! Modal state tracking
//!
//! The four persistent modal groups the device and the preview need:
//! distance mode (G90/G91), plane (G17/G18/G19), units (G20/G21) and motion
//! mode (G0-G3). A line that does not mention a group inherits the previous
//! line's value, independently per group.

use cncsend_core::Units;
use serde::{Deserialize, Serialize};

/// Distance mode modal group (G90/G91).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// G90 - coordinates are absolute machine positions
    Absolute,
    /// G91 - coordinates are offsets from the current position
    Incremental,
}

impl DistanceMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            90 => Some(DistanceMode::Absolute),
            91 => Some(DistanceMode::Incremental),
            _ => None,
        }
    }

    pub fn gcode(&self) -> &'static str {
        match self {
            DistanceMode::Absolute => "G90",
            DistanceMode::Incremental => "G91",
        }
    }
}

/// Plane selection modal group (G17/G18/G19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    /// G17
    Xy,
    /// G18
    Zx,
    /// G19
    Yz,
}

impl Plane {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            17 => Some(Plane::Xy),
            18 => Some(Plane::Zx),
            19 => Some(Plane::Yz),
            _ => None,
        }
    }

    pub fn gcode(&self) -> &'static str {
        match self {
            Plane::Xy => "G17",
            Plane::Zx => "G18",
            Plane::Yz => "G19",
        }
    }
}

/// Motion mode modal group (G0-G3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    /// G0
    Rapid,
    /// G1
    Linear,
    /// G2
    ArcCw,
    /// G3
    ArcCcw,
}

impl MotionMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MotionMode::Rapid),
            1 => Some(MotionMode::Linear),
            2 => Some(MotionMode::ArcCw),
            3 => Some(MotionMode::ArcCcw),
            _ => None,
        }
    }

    pub fn gcode(&self) -> &'static str {
        match self {
            MotionMode::Rapid => "G0",
            MotionMode::Linear => "G1",
            MotionMode::ArcCw => "G2",
            MotionMode::ArcCcw => "G3",
        }
    }

    /// True for the two circular interpolation modes
    pub fn is_arc(&self) -> bool {
        matches!(self, MotionMode::ArcCw | MotionMode::ArcCcw)
    }
}

/// The full modal register set carried line-to-line.
///
/// Invariant: always fully defined. The defaults mirror GRBL power-on state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalState {
    pub distance: DistanceMode,
    pub plane: Plane,
    pub units: Units,
    pub motion: MotionMode,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            distance: DistanceMode::Absolute,
            plane: Plane::Xy,
            units: Units::Millimeters,
            motion: MotionMode::Rapid,
        }
    }
}

/// Apply the modal inheritance rule for one group: a value parsed from the
/// current line wins, otherwise the previous line's value carries forward.
pub fn resolve<T: Copy>(current: Option<T>, previous: T) -> T {
    current.unwrap_or(previous)
}
