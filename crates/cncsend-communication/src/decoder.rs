//! GRBL response decoding
//!
//! Classifies every received line into one of the protocol's frame shapes
//! and extracts its payload. Decoding is total: a line that matches nothing
//! comes back as `Other` instead of an error, because firmware variants
//! emit chatter the stream must survive.

use cncsend_core::Point3;
use regex::Regex;
use std::sync::OnceLock;

use crate::machine::{MachineStatus, StatusReport};

fn setting_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"^\$(\d+) *= *(.*)$").expect("invalid regex pattern"))
}

/// One classified response line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    /// `ok`, the per-command acknowledgment that frees planner space
    Ack,
    /// `error:n`, the last command was rejected but streaming may continue
    DeviceError(u8),
    /// `ALARM` with an optional `:n` code, the device halted and needs
    /// reset or unlock
    Alarm(Option<u8>),
    /// `<...>` status frame
    Status(StatusReport),
    /// `[GC:...]` modal state echo, split into tokens
    ModalEcho(Vec<String>),
    /// `$n=value` settings line
    Setting { id: u16, raw: String },
    /// `[MSG:...]` and other bracketed feedback, payload only
    Feedback(String),
    /// The firmware banner printed after reset
    Welcome(String),
    /// Anything unrecognized
    Other(String),
}

/// Stateless line classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDecoder;

impl ResponseDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, line: &str) -> DecodedResponse {
        let line = line.trim();

        if line.eq_ignore_ascii_case("ok") {
            return DecodedResponse::Ack;
        }

        if let Some(code) = strip_prefix_ci(line, "error:") {
            return match code.trim().parse::<u8>() {
                Ok(code) => DecodedResponse::DeviceError(code),
                Err(_) => DecodedResponse::Other(line.to_string()),
            };
        }

        // the colon and code are optional; some firmware prints a bare ALARM
        if let Some(rest) = strip_prefix_ci(line, "alarm") {
            let code = rest.trim_start_matches(':').trim().parse::<u8>().ok();
            return DecodedResponse::Alarm(code);
        }

        if let Some(body) = line.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            return DecodedResponse::Status(parse_status_frame(body));
        }

        if let Some(body) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(gc) = strip_prefix_ci(body, "gc:") {
                return DecodedResponse::ModalEcho(
                    gc.split_whitespace().map(str::to_string).collect(),
                );
            }
            let payload = body.split_once(':').map(|(_, p)| p).unwrap_or(body);
            return DecodedResponse::Feedback(payload.to_string());
        }

        if let Some(caps) = setting_rex().captures(line) {
            if let Ok(id) = caps[1].parse::<u16>() {
                return DecodedResponse::Setting {
                    id,
                    raw: caps[2].to_string(),
                };
            }
        }

        if line.starts_with("Grbl") {
            return DecodedResponse::Welcome(line.to_string());
        }

        DecodedResponse::Other(line.to_string())
    }
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Parse the pipe-separated body of a `<...>` status frame.
///
/// Unknown fields are skipped; a malformed field invalidates only itself.
fn parse_status_frame(body: &str) -> StatusReport {
    let mut report = StatusReport::default();
    let mut fields = body.split('|');

    if let Some(first) = fields.next() {
        report.status = MachineStatus::parse(first);
        if report.status.is_none() {
            tracing::warn!(field = first, "unrecognized machine status");
        }
    }

    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "mpos" => report.mpos = parse_point(value),
            "wpos" => report.wpos = parse_point(value),
            "wco" => report.wco = parse_point(value),
            "fs" => {
                let mut parts = value.split(',');
                report.feed = parts.next().and_then(|v| v.parse().ok());
                report.speed = parts.next().and_then(|v| v.parse().ok());
            }
            "f" => report.feed = value.parse().ok(),
            "bf" => {
                let mut parts = value.split(',');
                let blocks = parts.next().and_then(|v| v.parse().ok());
                let bytes = parts.next().and_then(|v| v.parse().ok());
                if let (Some(blocks), Some(bytes)) = (blocks, bytes) {
                    report.buffer = Some((blocks, bytes));
                }
            }
            // Ov, Pn, Ln, A and friends are not mirrored
            _ => {}
        }
    }

    report
}

fn parse_point(value: &str) -> Option<Point3> {
    let mut parts = value.split(',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    let z = parts.next()?.trim().parse().ok()?;
    Some(Point3::new(x, y, z))
}

/// Human-readable text for a GRBL v1.1 `error:n` code.
pub fn describe_error(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid $ statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse too short",
        7 => "EEPROM read failed",
        8 => "Not idle, command rejected",
        9 => "Locked out, alarm or jog active",
        10 => "Soft limits need homing",
        11 => "Line too long",
        12 => "Step rate too high",
        13 => "Safety door open",
        14 => "Line length exceeded",
        15 => "Jog travel exceeded",
        16 => "Invalid jog command",
        17 => "Laser mode needs PWM",
        20 => "Unsupported command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires integer value",
        24 => "More than one command per modal group",
        25 => "Repeated g-code word",
        26 => "No axis words found",
        27 => "Invalid line number",
        28 => "Missing required value word",
        29 => "Unsupported work coordinate system",
        30 => "G53 needs G0 or G1",
        31 => "Unneeded axis words",
        32 => "Arc without axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc without offset words in plane",
        36 => "Unused value words",
        37 => "Tool length offset axis",
        38 => "Invalid tool number",
        _ => "Unknown error",
    }
}

/// Human-readable text for a GRBL v1.1 `ALARM:n` code.
pub fn describe_alarm(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Reset during motion",
        4 => "Probe fail, initial state",
        5 => "Probe fail, no contact",
        6 => "Homing fail, reset",
        7 => "Homing fail, door opened",
        8 => "Homing fail, limit still active",
        9 => "Homing fail, limit not found",
        _ => "Unknown alarm",
    }
}
