//! Wire abstraction and command framing
//!
//! `WireLink` is the seam between the protocol engine and whatever carries
//! bytes to the device; the real implementation is `SerialLink`, tests use
//! scripted mocks.

use cncsend_core::{Error, ProtocolError, Result};

/// GRBL real-time control bytes. These act immediately and never consume
/// planner buffer space.
pub mod realtime {
    /// Ctrl-X, soft reset
    pub const RESET: u8 = 0x18;
    /// Status report query
    pub const STATUS: u8 = b'?';
    /// Feed hold
    pub const HOLD: u8 = b'!';
    /// Cycle start / resume
    pub const RESUME: u8 = b'~';
    /// Safety door
    pub const DOOR: u8 = 0x84;
    /// Jog cancel
    pub const JOG_CANCEL: u8 = 0x85;
}

/// Byte transport to the device.
///
/// `receive_lines` must never block for long; the engine calls it once per
/// tick and treats an empty result as "nothing arrived yet".
pub trait WireLink: Send {
    /// Write raw bytes to the device.
    fn transmit(&mut self, data: &[u8]) -> Result<()>;

    /// Drain complete lines received since the last call, newline stripped.
    fn receive_lines(&mut self) -> Result<Vec<String>>;

    /// Human-readable endpoint name for logs.
    fn describe(&self) -> String;
}

/// Frame one queued command for the wire.
///
/// Commands written as `0x`-prefixed hex pairs (for example `0x18` or
/// `0x9118`) are decoded to raw bytes and sent without a newline; these are
/// the real-time controls. Everything else is uppercased ASCII with a
/// trailing newline, which also covers single-character commands like `?`
/// and `!`.
pub fn frame_command(command: &str) -> Result<Vec<u8>> {
    let trimmed = command.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        // byte-wise pairs; a non-ASCII payload must fail, not slice mid-char
        if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
            return Err(bad_command(trimmed, "hex digit pairs expected"));
        }
        let mut bytes = Vec::with_capacity(hex.len() / 2);
        for pair in hex.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(pair)
                .map_err(|_| bad_command(trimmed, "hex digit pairs expected"))?;
            let byte = u8::from_str_radix(pair, 16)
                .map_err(|_| bad_command(trimmed, "hex digit pairs expected"))?;
            bytes.push(byte);
        }
        return Ok(bytes);
    }

    let mut bytes = trimmed.to_uppercase().into_bytes();
    bytes.push(b'\n');
    Ok(bytes)
}

fn bad_command(command: &str, reason: &str) -> Error {
    ProtocolError::BadCommand {
        command: command.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_commands_get_uppercased_and_terminated() {
        assert_eq!(frame_command("g0 x10").unwrap(), b"G0 X10\n");
        assert_eq!(frame_command("?").unwrap(), b"?\n");
        assert_eq!(frame_command("  $G \n").unwrap(), b"$G\n");
    }

    #[test]
    fn hex_commands_decode_to_raw_bytes() {
        assert_eq!(frame_command("0x18").unwrap(), vec![realtime::RESET]);
        assert_eq!(frame_command("0x85").unwrap(), vec![realtime::JOG_CANCEL]);
        assert_eq!(frame_command("0x9118").unwrap(), vec![0x91, 0x18]);
    }

    #[test]
    fn malformed_hex_is_rejected(){
        assert!(frame_command("0x1").is_err());
        assert!(frame_command("0xZZ").is_err());
        assert!(frame_command("0x").is_err());
    }

    #[test]
    fn multibyte_hex_payload_is_rejected_not_split() {
        // even-length multi-byte text must come back as the framing error
        assert!(frame_command("0x\u{20ac}\u{20ac}").is_err());
        assert!(frame_command("0x1\u{e9}").is_err());
    }
}
