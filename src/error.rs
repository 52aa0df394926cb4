//! Error types for the bridge session.
//!
//! Errors fall into two groups:
//!
//! - **Startup errors** (`TransportNotReady`, `TransportOpen`, `ThreadStartFailure`,
//!   `Config`) abort [`Session::start`](crate::Session::start) and are reported to
//!   the caller.
//! - **Steady-state errors** (`TransportRead`, `TransportWrite`, `Decode`,
//!   `Checksum`, `Encode`, `Metrics`) happen per frame or per send. The ingest and
//!   command loops absorb them, log them, and keep running.
//!
//! ```rust
//! use mavbridge::BridgeError;
//!
//! let error = BridgeError::transport_write("serial link saturated");
//! assert!(!error.is_fatal_to_startup());
//! assert!(error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Transport is not running; open it before starting the session")]
    TransportNotReady,

    #[error("Failed to open {transport} transport: {reason}")]
    TransportOpen {
        transport: &'static str,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to start {task} task: {reason}")]
    ThreadStartFailure { task: &'static str, reason: String },

    #[error("Transport read failed: {reason}")]
    TransportRead {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport write failed: {reason}")]
    TransportWrite {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Decode error for message {message_id}: {details}")]
    Decode { message_id: u32, details: String },

    #[error("Checksum mismatch for message {message_id}: expected {expected:#06x}, got {actual:#06x}")]
    Checksum { message_id: u32, expected: u16, actual: u16 },

    #[error("Encode error: {details}")]
    Encode { details: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Metrics sink error: {reason}")]
    Metrics {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Background task {task} did not shut down cleanly")]
    TaskJoin {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns whether this error aborts session startup.
    pub fn is_fatal_to_startup(&self) -> bool {
        matches!(
            self,
            BridgeError::TransportNotReady
                | BridgeError::TransportOpen { .. }
                | BridgeError::ThreadStartFailure { .. }
                | BridgeError::Config { .. }
        )
    }

    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::TransportNotReady => true,
            BridgeError::TransportOpen { .. } => true,
            BridgeError::ThreadStartFailure { .. } => false,
            BridgeError::TransportRead { .. } => true,
            BridgeError::TransportWrite { .. } => true,
            BridgeError::Decode { .. } => false,
            BridgeError::Checksum { .. } => false,
            BridgeError::Encode { .. } => false,
            BridgeError::Config { .. } => false,
            BridgeError::Metrics { .. } => true,
            BridgeError::TaskJoin { .. } => false,
            BridgeError::Io(_) => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::TransportNotReady => vec![
                "Call Transport::open before Session::start",
                "Check that the transport was not closed by another task",
            ],
            BridgeError::TransportOpen { .. } => vec![
                "Check the serial device path or UDP bind address",
                "Verify no other process holds the device or port",
                "Check permissions on the serial device (dialout group)",
            ],
            BridgeError::ThreadStartFailure { .. } => vec![
                "Start the session from inside a Tokio runtime",
                "Check that the runtime has not been shut down",
            ],
            BridgeError::TransportRead { .. } | BridgeError::TransportWrite { .. } => vec![
                "Check the cable or network link to the vehicle",
                "Verify the baud rate matches the autopilot configuration",
            ],
            BridgeError::Decode { .. } | BridgeError::Checksum { .. } => vec![
                "Check that both ends use the same MAVLink dialect",
                "Look for line noise or a baud rate mismatch",
            ],
            BridgeError::Encode { .. } => vec!["Check the setpoint values are finite"],
            BridgeError::Config { .. } => vec![
                "Check the YAML configuration against the documented schema",
                "Check command-line overrides",
            ],
            BridgeError::Metrics { .. } => vec![
                "Verify the InfluxDB UDP listener is enabled",
                "Check the metrics address and port",
            ],
            BridgeError::TaskJoin { .. } => vec!["Inspect earlier log output for a task panic"],
            BridgeError::Io(_) => vec!["Check the underlying device or socket"],
        }
    }

    /// Helper constructor for transport open failures.
    pub fn transport_open(
        transport: &'static str,
        reason: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        BridgeError::TransportOpen { transport, reason: reason.into(), source }
    }

    /// Helper constructor for task spawn failures.
    pub fn thread_start(task: &'static str, reason: impl Into<String>) -> Self {
        BridgeError::ThreadStartFailure { task, reason: reason.into() }
    }

    /// Helper constructor for read failures.
    pub fn transport_read(reason: impl Into<String>) -> Self {
        BridgeError::TransportRead { reason: reason.into(), source: None }
    }

    /// Helper constructor for read failures with source.
    pub fn transport_read_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::TransportRead { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for write failures.
    pub fn transport_write(reason: impl Into<String>) -> Self {
        BridgeError::TransportWrite { reason: reason.into(), source: None }
    }

    /// Helper constructor for write failures with source.
    pub fn transport_write_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::TransportWrite { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for decode failures.
    pub fn decode_error(message_id: u32, details: impl Into<String>) -> Self {
        BridgeError::Decode { message_id, details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        BridgeError::Config { reason: reason.into() }
    }

    /// Helper constructor for metrics sink failures.
    pub fn metrics(
        reason: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        BridgeError::Metrics { reason: reason.into(), source }
    }
}

impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        BridgeError::TransportOpen {
            transport: "serial",
            reason: err.description.clone(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml_ng::Error> for BridgeError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        BridgeError::Config { reason: err.to_string() }
    }
}
