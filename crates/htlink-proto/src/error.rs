use std::time::Duration;

use thiserror::Error;

use crate::session::SessionStateKind;

/// Top-level error type for the `htlink-proto` crate.
///
/// Covers transport failures, login rejection, frame/payload decoding,
/// and misuse of the session state machine. `htlink-core` maps these
/// into cycle-level failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Could not open the TCP connection (refused, unreachable, DNS).
    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on an established connection.
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The device closed the connection while a response was pending.
    #[error("Connection closed by device")]
    ConnectionClosed,

    /// An open, send or receive did not complete within the configured timeout.
    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    // ── Authentication ──────────────────────────────────────────────
    /// The device answered the login request negatively.
    #[error("Login rejected by device: {message}")]
    Authentication { message: String },

    // ── Protocol ────────────────────────────────────────────────────
    /// Frame or payload could not be understood.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request payload does not fit into a single frame.
    #[error("Payload of {len} bytes exceeds the {max}-byte frame limit")]
    PayloadTooLong { len: usize, max: usize },

    // ── State machine ───────────────────────────────────────────────
    /// Operation issued in a session state that does not allow it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionStateKind,
    },
}

/// Decoding failures for a single frame or payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame or payload could not be parsed.
    #[error("Malformed frame: {reason}")]
    Malformed { reason: String },

    /// The trailing checksum byte does not match the frame contents.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The frame header is neither a known request nor response header.
    #[error("Unknown frame header {header:02x?}")]
    HeaderMismatch { header: Vec<u8> },

    /// The response answers a different command than the one sent.
    #[error("Unexpected response: expected {expected}, got '{got}'")]
    UnexpectedResponse { expected: String, got: String },

    /// The device answered with `ERR,<code>;`.
    #[error("Device reported fault (code {code})")]
    DeviceFault { code: String },
}

impl Error {
    /// Returns `true` if the session can no longer be trusted after this
    /// error and must be reset before any further request.
    ///
    /// Device-reported faults are answers to a well-formed exchange, so
    /// they leave the session usable.
    pub fn is_session_fault(&self) -> bool {
        match self {
            Self::Protocol(ProtocolError::DeviceFault { .. })
            | Self::InvalidState { .. }
            | Self::PayloadTooLong { .. } => false,
            Self::Connect { .. }
            | Self::Io(_)
            | Self::ConnectionClosed
            | Self::Timeout { .. }
            | Self::Authentication { .. }
            | Self::Protocol(_) => true,
        }
    }

    /// Returns `true` for timeout errors.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the device fault code, if the device reported one.
    pub fn device_fault_code(&self) -> Option<&str> {
        match self {
            Self::Protocol(ProtocolError::DeviceFault { code }) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_fault_keeps_session() {
        let err = Error::from(ProtocolError::DeviceFault { code: "7".into() });
        assert!(!err.is_session_fault());
        assert_eq!(err.device_fault_code(), Some("7"));
    }

    #[test]
    fn decode_and_timeout_errors_fault_the_session() {
        let malformed = Error::from(ProtocolError::Malformed {
            reason: "garbage".into(),
        });
        let timeout = Error::Timeout {
            operation: "receive",
            timeout: Duration::from_secs(1),
        };
        assert!(malformed.is_session_fault());
        assert!(timeout.is_session_fault());
        assert!(timeout.is_timeout());
    }
}
