//! Error taxonomy for cncsend
//!
//! Parse leniency is deliberate: a malformed word never aborts a program
//! load, it falls back to modal inheritance and is logged by the
//! interpreter. The variants here cover the conditions that *do* propagate.

use thiserror::Error;

/// Protocol and device errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Device reported `error:x`; the program stream continues.
    #[error("Device error {code}: {description}")]
    DeviceError {
        /// The numeric GRBL error code.
        code: u8,
        /// Human-readable decode of the code.
        description: String,
    },

    /// Device entered an alarm state; Normal sends must be paused by the
    /// controlling logic until the device is unlocked.
    #[error("Device alarm: {detail}")]
    Alarm {
        /// The raw alarm text including any sub-code.
        detail: String,
    },

    /// A command could not be framed for the wire.
    #[error("Unframeable command {command:?}: {reason}")]
    BadCommand {
        /// The command text as enqueued.
        command: String,
        /// Why framing failed.
        reason: String,
    },
}

/// Top-level error type shared across the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol-level error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport became unavailable; the engine stops cleanly, machine
    /// state resets, queues are flushed.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Error::Other(message.into())
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let e = ProtocolError::DeviceError {
            code: 2,
            description: "Bad number format".to_string(),
        };
        assert_eq!(e.to_string(), "Device error 2: Bad number format");

        let e = ProtocolError::BadCommand {
            command: "0xZZ".to_string(),
            reason: "hex digit pairs expected".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Unframeable command \"0xZZ\": hex digit pairs expected"
        );

        let e = Error::ConnectionLost("port removed".to_string());
        assert_eq!(e.to_string(), "Connection lost: port removed");
    }

    #[test]
    fn conversions_into_top_level() {
        let e: Error = ProtocolError::Alarm {
            detail: "Hard limit triggered".to_string(),
        }
        .into();
        assert!(matches!(e, Error::Protocol(_)));
    }
}
