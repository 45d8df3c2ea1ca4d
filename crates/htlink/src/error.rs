//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use htlink_config::ConfigError;
use htlink_core::{CatalogError, CoreError, WriteRejection};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const DEVICE: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to heat pump at {addr}")]
    #[diagnostic(
        code(htlink::connection_failed),
        help(
            "Check that the heat pump (or its serial-over-TCP bridge) is powered and reachable.\n\
             Reason: {reason}\n\
             Try: htlink read --host <ip> --port 9999"
        )
    )]
    ConnectionFailed { addr: String, reason: String },

    #[error("Heat pump rejected the login: {message}")]
    #[diagnostic(
        code(htlink::auth_failed),
        help("Another client may be holding the device's only session. Retry in a moment.")
    )]
    AuthFailed { message: String },

    #[error("Heat pump did not answer {operation} within {millis}ms")]
    #[diagnostic(
        code(htlink::timeout),
        help("Increase the timeout with --timeout or check the link to the heat pump.")
    )]
    Timeout { operation: String, millis: u128 },

    // ── Device ───────────────────────────────────────────────────────

    #[error("Protocol error: {message}")]
    #[diagnostic(code(htlink::protocol))]
    Protocol { message: String },

    #[error("Heat pump reported fault code {code}")]
    #[diagnostic(code(htlink::device_fault))]
    DeviceFault { code: String },

    // ── Parameters ───────────────────────────────────────────────────

    #[error("Unknown parameter '{id}'")]
    #[diagnostic(
        code(htlink::unknown_parameter),
        help("Run: htlink params to see available parameters")
    )]
    UnknownParameter { id: String },

    #[error("Parameter '{id}' is read-only")]
    #[diagnostic(
        code(htlink::not_writable),
        help("Run: htlink params --writable to see settings that can be changed")
    )]
    NotWritable { id: String },

    #[error("Value {value} is not valid for '{id}': {reason}")]
    #[diagnostic(code(htlink::out_of_range))]
    OutOfRange {
        id: String,
        value: String,
        reason: String,
    },

    // ── Write access ─────────────────────────────────────────────────

    #[error("Writes are disabled")]
    #[diagnostic(
        code(htlink::write_blocked),
        help("Confirm the write when prompted, or pass --yes.")
    )]
    WriteBlocked,

    #[error("Writes are not permitted for this profile")]
    #[diagnostic(
        code(htlink::writes_not_permitted),
        help(
            "Set write_enabled = true in the profile to allow writes:\n\
             {path}"
        )
    )]
    WritesNotPermitted { path: String },

    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(htlink::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(htlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(htlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: htlink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No heat pump configured")]
    #[diagnostic(
        code(htlink::no_config),
        help(
            "Create a profile with: htlink config init\n\
             Or pass --host <ip>.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(htlink::config))]
    Config { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────

    #[error("Interrupted")]
    #[diagnostic(code(htlink::interrupted))]
    Interrupted,

    #[error("Internal error: {message}")]
    #[diagnostic(code(htlink::internal))]
    Internal { message: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {message}")]
    #[diagnostic(code(htlink::render))]
    Render { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Protocol { .. } | Self::DeviceFault { .. } => exit_code::DEVICE,
            Self::UnknownParameter { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::NOT_FOUND
            }
            Self::NotWritable { .. } | Self::WriteBlocked | Self::WritesNotPermitted { .. } => {
                exit_code::PERMISSION
            }
            Self::OutOfRange { .. }
            | Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Interrupted => exit_code::INTERRUPTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectFailed { addr, reason } => CliError::ConnectionFailed { addr, reason },
            CoreError::AuthFailed { message } => CliError::AuthFailed { message },
            CoreError::Timeout { operation, timeout } => CliError::Timeout {
                operation,
                millis: timeout.as_millis(),
            },
            CoreError::Transport { message } | CoreError::Protocol { message } => {
                CliError::Protocol { message }
            }
            CoreError::DeviceFault { code } => CliError::DeviceFault { code },
            CoreError::Rejected(rejection) => rejection.into(),
            CoreError::WritesNotPermitted => CliError::WritesNotPermitted {
                path: htlink_config::config_path().display().to_string(),
            },
            CoreError::Catalog(CatalogError::NotFound { id }) => CliError::UnknownParameter { id },
            CoreError::Catalog(err) => CliError::Validation {
                field: "parameter".into(),
                reason: err.to_string(),
            },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::CycleInProgress => CliError::Internal {
                message: "a polling cycle is already running".into(),
            },
            CoreError::ShuttingDown => CliError::Interrupted,
            CoreError::Internal(message) => CliError::Internal { message },
        }
    }
}

impl From<WriteRejection> for CliError {
    fn from(err: WriteRejection) -> Self {
        match err {
            WriteRejection::WriteBlocked => CliError::WriteBlocked,
            WriteRejection::UnknownParameter { id } => CliError::UnknownParameter { id },
            WriteRejection::NotWritable { id } => CliError::NotWritable { id },
            WriteRejection::OutOfRange { id, value, reason } => {
                CliError::OutOfRange { id, value, reason }
            }
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
