// ── Core error types ──
//
// Domain-level errors for the coordinator. Consumers never see raw frames
// or socket errors: the `From<htlink_proto::Error>` impl translates
// transport-layer failures into the cycle-level taxonomy below.

use std::time::Duration;

use thiserror::Error;

use crate::catalog::QueryClass;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to heat pump at {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("Login failed: {message}")]
    AuthFailed { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Heat pump did not answer {operation} within {}ms", timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Heat pump reported fault (code {code})")]
    DeviceFault { code: String },

    // ── Cycle errors ─────────────────────────────────────────────────
    #[error("A polling cycle is already in progress")]
    CycleInProgress,

    #[error("Coordinator is shutting down")]
    ShuttingDown,

    // ── Write errors ─────────────────────────────────────────────────
    #[error(transparent)]
    Rejected(#[from] WriteRejection),

    #[error("Writes are not permitted by the active configuration")]
    WritesNotPermitted,

    // ── Catalog / configuration errors ───────────────────────────────
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Synchronous write rejections, in the order the gate checks them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteRejection {
    #[error("Writes are disabled; confirm write access first")]
    WriteBlocked,

    #[error("Unknown parameter: {id}")]
    UnknownParameter { id: String },

    #[error("Parameter {id} is read-only")]
    NotWritable { id: String },

    #[error("Value {value} is out of range for {id}: {reason}")]
    OutOfRange {
        id: String,
        value: String,
        reason: String,
    },
}

/// Errors raised while building or querying a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Unknown parameter: {id}")]
    NotFound { id: String },

    #[error("Duplicate parameter identifier: {id}")]
    DuplicateId { id: String },

    #[error("Register {number} is used twice in the {class} class ({first} and {second})")]
    DuplicateNumber {
        class: QueryClass,
        number: u16,
        first: String,
        second: String,
    },

    #[error("Invalid descriptor {id}: {reason}")]
    InvalidDescriptor { id: String, reason: String },
}

impl CoreError {
    /// Returns `true` for errors that mean the device could not be reached
    /// or did not let us in, as opposed to errors during the exchange.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::AuthFailed { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` for synchronous write rejections.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::WritesNotPermitted)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<htlink_proto::Error> for CoreError {
    fn from(err: htlink_proto::Error) -> Self {
        use htlink_proto::{Error as ProtoError, ProtocolError};

        match err {
            ProtoError::Connect { addr, source } => CoreError::ConnectFailed {
                addr,
                reason: source.to_string(),
            },
            ProtoError::Authentication { message } => CoreError::AuthFailed { message },
            ProtoError::Timeout { operation, timeout } => CoreError::Timeout {
                operation: operation.to_owned(),
                timeout,
            },
            ProtoError::Io(e) => CoreError::Transport {
                message: e.to_string(),
            },
            ProtoError::ConnectionClosed => CoreError::Transport {
                message: "connection closed by device".into(),
            },
            ProtoError::Protocol(ProtocolError::DeviceFault { code }) => {
                CoreError::DeviceFault { code }
            }
            ProtoError::Protocol(e) => CoreError::Protocol {
                message: e.to_string(),
            },
            ProtoError::PayloadTooLong { len, max } => CoreError::Protocol {
                message: format!("request of {len} bytes exceeds the {max}-byte frame limit"),
            },
            ProtoError::InvalidState { operation, state } => {
                CoreError::Internal(format!("cannot {operation} while session is {state}"))
            }
        }
    }
}
