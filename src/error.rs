//! Error types for toolhost
//!
//! Centralized error handling using thiserror. Per-item failures (one bad
//! config file, one unreachable server) are captured into result records and
//! never surface here; only setup and teardown errors propagate.

use thiserror::Error;

use crate::resources::TeardownError;

/// All error types that can occur in toolhost
#[derive(Debug, Error)]
pub enum ToolhostError {
    /// Tool configuration is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The adapter registry was set up incorrectly
    #[error("Registry error: {0}")]
    Registry(String),

    /// A native module or function could not be resolved
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A remote tool server could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A remote tool server answered with a protocol-level error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Optional transport support was not compiled in
    #[error("{0}")]
    DependencyMissing(String),

    /// Session persistence failed
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// One or more teardown actions failed
    #[error(transparent)]
    Teardown(#[from] TeardownError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for toolhost operations
pub type Result<T> = std::result::Result<T, ToolhostError>;
