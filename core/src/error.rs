//! Error types for the portpilot-core library.

use thiserror::Error;

/// Result type alias for port-forward operations.
pub type Result<T> = std::result::Result<T, ForwardError>;

/// Errors that can occur while managing port-forward tunnels.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// An operation required a tracked tunnel that does not exist.
    #[error("Port-forward not found: {0}")]
    NotFound(String),

    /// The control backend rejected or failed a tunnel request.
    #[error("Control API error: {0}")]
    Control(String),

    /// Persistent storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A local port was still accepting connections when the stop wait expired.
    #[error("Port {port} still in use after {waited_ms}ms")]
    PortNotReleased { port: u16, waited_ms: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
