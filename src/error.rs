//! # Error Types
//!
//! Custom error types for Teensy Bridge using `thiserror`.

use thiserror::Error;

use crate::radio::protocol::HandshakeStep;

/// Main error type for Teensy Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Stream ended before the telemetry header marker was seen
    #[error("telemetry header not found before stream closed ({discarded} bytes discarded)")]
    SyncNotFound { discarded: usize },

    /// Header found but the payload was truncated
    #[error("incomplete telemetry frame: expected {expected} payload bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// Cancellation was observed while waiting for telemetry
    #[error("telemetry read cancelled")]
    Cancelled,

    /// Collection ended without a single decoded sample
    #[error("no telemetry received")]
    NoTelemetry,

    /// No enumerated device matched the description
    #[error("no device matching \"{0}\" found")]
    DeviceNotFound(String),

    /// More than one enumerated device matched the description
    #[error("multiple devices match \"{description}\": {}", .ports.join(", "))]
    MultipleDevicesFound {
        description: String,
        ports: Vec<String>,
    },

    /// Peer did not acknowledge a handshake step within the transport timeout
    #[error("handshake timed out waiting for acknowledgment of {step}")]
    HandshakeTimeout { step: HandshakeStep },

    /// Connection terminated during a handshake step
    #[error("transport closed during {step}")]
    TransportClosed { step: HandshakeStep },

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON export errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Teensy Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
