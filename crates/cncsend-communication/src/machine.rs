//! Mirrored device state
//!
//! `MachineState` holds the last reported status, positions, buffer
//! headroom, modal state echo and settings. It is shared between the engine
//! (writer) and everything that displays or gates on device state (readers).

use cncsend_core::Point3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::settings::{SettingValue, SettingsMap};

/// Device execution state as reported in status frames.
///
/// Hold, Alarm and Door carry the firmware sub-code when one was reported
/// (for example `Hold:1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineStatus {
    Disconnected,
    Idle,
    Run,
    Hold(Option<u8>),
    Jog,
    Alarm(Option<u8>),
    Door(Option<u8>),
    Check,
    Home,
    Sleep,
}

impl MachineStatus {
    /// Parse the leading field of a status frame, e.g. `Idle` or `Hold:1`.
    pub fn parse(field: &str) -> Option<Self> {
        let (name, code) = match field.split_once(':') {
            Some((n, c)) => (n, c.parse::<u8>().ok()),
            None => (field, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "idle" => Some(MachineStatus::Idle),
            "run" => Some(MachineStatus::Run),
            "hold" => Some(MachineStatus::Hold(code)),
            "jog" => Some(MachineStatus::Jog),
            "alarm" => Some(MachineStatus::Alarm(code)),
            "door" => Some(MachineStatus::Door(code)),
            "check" => Some(MachineStatus::Check),
            "home" => Some(MachineStatus::Home),
            "sleep" => Some(MachineStatus::Sleep),
            _ => None,
        }
    }

    /// Whether the device will execute queued motion in this state.
    pub fn accepts_motion(&self) -> bool {
        matches!(
            self,
            MachineStatus::Idle | MachineStatus::Run | MachineStatus::Jog | MachineStatus::Check
        )
    }
}

/// One parsed `<...>` status frame. Fields the frame omitted are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub status: Option<MachineStatus>,
    pub mpos: Option<Point3>,
    pub wpos: Option<Point3>,
    pub wco: Option<Point3>,
    pub feed: Option<f64>,
    pub speed: Option<f64>,
    /// (planner blocks free, rx bytes free)
    pub buffer: Option<(u32, u32)>,
}

/// Modal state as echoed by a `[GC:...]` frame, one field per modal group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalEcho {
    pub motion: String,
    pub wcs: String,
    pub plane: String,
    pub units: String,
    pub distance: String,
    pub arc_distance: String,
    pub feed_mode: String,
    pub cutter_comp: String,
    pub tool_length: String,
    pub program: String,
    pub spindle: String,
    pub coolant: String,
    pub tool: u32,
    pub feed: f64,
    pub speed: f64,
}

impl Default for ModalEcho {
    fn default() -> Self {
        // GRBL power-on modal state
        Self {
            motion: "G0".to_string(),
            wcs: "G54".to_string(),
            plane: "G17".to_string(),
            units: "G21".to_string(),
            distance: "G90".to_string(),
            arc_distance: "G91.1".to_string(),
            feed_mode: "G94".to_string(),
            cutter_comp: "G40".to_string(),
            tool_length: "G49".to_string(),
            program: "M0".to_string(),
            spindle: "M5".to_string(),
            coolant: "M9".to_string(),
            tool: 0,
            feed: 0.0,
            speed: 0.0,
        }
    }
}

impl ModalEcho {
    /// Apply one token from a modal echo. Returns true when the value
    /// actually changed, so repeated `$G` polls stay quiet.
    pub fn apply_token(&mut self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() || !token.is_ascii() {
            return false;
        }
        match token.split_at(1) {
            ("G", code) => match code {
                "0" | "1" | "2" | "3" | "80" => replace(&mut self.motion, token),
                c if c.starts_with("38") => replace(&mut self.motion, token),
                "54" | "55" | "56" | "57" | "58" | "59" => replace(&mut self.wcs, token),
                "17" | "18" | "19" => replace(&mut self.plane, token),
                "20" | "21" => replace(&mut self.units, token),
                "90" | "91" => replace(&mut self.distance, token),
                "90.1" | "91.1" => replace(&mut self.arc_distance, token),
                "93" | "94" => replace(&mut self.feed_mode, token),
                "40" | "41" | "42" => replace(&mut self.cutter_comp, token),
                "43.1" | "49" => replace(&mut self.tool_length, token),
                _ => false,
            },
            ("M", code) => match code {
                "0" | "1" | "2" | "30" => replace(&mut self.program, token),
                "3" | "4" | "5" => replace(&mut self.spindle, token),
                "7" | "8" | "9" => replace(&mut self.coolant, token),
                _ => false,
            },
            ("T", value) => match value.parse::<u32>() {
                Ok(t) if t != self.tool => {
                    self.tool = t;
                    true
                }
                _ => false,
            },
            ("F", value) => replace_f64(&mut self.feed, value),
            ("S", value) => replace_f64(&mut self.speed, value),
            _ => false,
        }
    }
}

fn replace(slot: &mut String, token: &str) -> bool {
    if slot == token {
        false
    } else {
        *slot = token.to_string();
        true
    }
}

fn replace_f64(slot: &mut f64, value: &str) -> bool {
    match value.parse::<f64>() {
        Ok(v) if (v - *slot).abs() > f64::EPSILON => {
            *slot = v;
            true
        }
        _ => false,
    }
}

/// Point-in-time copy of the mirrored positions and counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub status: MachineStatus,
    /// Machine position, millimeters
    pub mpos: Point3,
    /// Work position, millimeters
    pub wpos: Point3,
    /// Work coordinate offset, millimeters
    pub wco: Point3,
    /// Current feed rate as reported
    pub feed: f64,
    /// Current spindle speed as reported
    pub speed: f64,
    /// Planner blocks free, from the Bf field
    pub planner_blocks_free: u32,
    /// Serial RX bytes free, from the Bf field
    pub rx_bytes_free: u32,
}

impl Default for MachineSnapshot {
    fn default() -> Self {
        Self {
            status: MachineStatus::Disconnected,
            mpos: Point3::ZERO,
            wpos: Point3::ZERO,
            wco: Point3::ZERO,
            feed: 0.0,
            speed: 0.0,
            // assume full headroom until the first Bf field arrives
            planner_blocks_free: 15,
            rx_bytes_free: 128,
        }
    }
}

/// Shared mirror of the connected device.
#[derive(Debug, Default)]
pub struct MachineState {
    snapshot: RwLock<MachineSnapshot>,
    modal: RwLock<ModalEcho>,
    settings: RwLock<SettingsMap>,
}

impl MachineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        *self.snapshot.read()
    }

    pub fn status(&self) -> MachineStatus {
        self.snapshot.read().status
    }

    pub fn set_status(&self, status: MachineStatus) {
        self.snapshot.write().status = status;
    }

    /// Planner headroom used for flow control gating.
    pub fn planner_blocks_free(&self) -> u32 {
        self.snapshot.read().planner_blocks_free
    }

    /// Fold one status frame into the mirror.
    ///
    /// Whichever of MPos/WPos the frame carried, the other is derived from
    /// the last known work coordinate offset (WPos = MPos - WCO).
    pub fn apply_report(&self, report: &StatusReport) {
        let mut snap = self.snapshot.write();
        if let Some(status) = report.status {
            snap.status = status;
        }
        if let Some(wco) = report.wco {
            snap.wco = wco;
        }
        if let Some(mpos) = report.mpos {
            snap.mpos = mpos;
            snap.wpos = mpos - snap.wco;
        }
        if let Some(wpos) = report.wpos {
            snap.wpos = wpos;
            snap.mpos = wpos + snap.wco;
        }
        if let Some(feed) = report.feed {
            snap.feed = feed;
        }
        if let Some(speed) = report.speed {
            snap.speed = speed;
        }
        if let Some((blocks, bytes)) = report.buffer {
            snap.planner_blocks_free = blocks;
            snap.rx_bytes_free = bytes;
        }
    }

    pub fn modal(&self) -> ModalEcho {
        self.modal.read().clone()
    }

    /// Apply a full modal echo, returning the tokens whose values changed.
    pub fn apply_modal_tokens<'a>(&self, tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut modal = self.modal.write();
        tokens
            .filter(|t| modal.apply_token(t))
            .map(str::to_string)
            .collect()
    }

    pub fn setting(&self, id: u16) -> Option<SettingValue> {
        self.settings.read().get(&id).cloned()
    }

    pub fn settings(&self) -> SettingsMap {
        self.settings.read().clone()
    }

    /// Store one `$id=raw` settings line. Returns true when the decoded
    /// value differs from what the mirror held.
    pub fn apply_setting(&self, id: u16, raw: &str) -> bool {
        let value = SettingValue::decode(id, raw);
        let mut settings = self.settings.write();
        let changed = settings
            .get(&id)
            .map(|old| !old.approx_eq(&value))
            .unwrap_or(true);
        if changed {
            tracing::debug!(id, ?value, "setting changed");
            settings.insert(id, value);
        }
        changed
    }

    /// Full state dump for diagnostics and dashboards.
    pub fn diagnostics(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot": self.snapshot(),
            "modal": self.modal(),
            "settings": self.settings(),
        })
    }

    /// Forget everything reported by a previous connection.
    pub fn reset(&self) {
        *self.snapshot.write() = MachineSnapshot::default();
        *self.modal.write() = ModalEcho::default();
        self.settings.write().clear();
    }
}
