//! Result and error types for coverage collection.

use thiserror::Error;

/// Result type for coverage operations
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Errors that can occur while collecting coverage
#[derive(Debug, Error)]
pub enum CoverageError {
    /// `start` called on a tracker that is already collecting
    #[error("{kind} coverage is already enabled")]
    AlreadyEnabled {
        /// Resource kind ("JS" or "CSS")
        kind: &'static str,
    },

    /// `stop` called on a tracker that is idle
    #[error("{kind} coverage is not enabled")]
    NotEnabled {
        /// Resource kind ("JS" or "CSS")
        kind: &'static str,
    },

    /// Fetching one resource's source text failed.
    ///
    /// Never surfaced by `stop`; the resource is dropped from the results.
    #[error("Failed to fetch source for resource {resource_id}: {message}")]
    ResourceFetch {
        /// Target-assigned resource id
        resource_id: String,
        /// Error message
        message: String,
    },

    /// The target rejected a protocol command
    #[error("Protocol command {method} failed: {message}")]
    ProtocolCommand {
        /// CDP method name
        method: String,
        /// Error message
        message: String,
    },

    /// A response or event payload could not be decoded
    #[error("Invalid {context} payload: {message}")]
    InvalidPayload {
        /// What was being decoded
        context: String,
        /// Error message
        message: String,
    },

    /// Connection to the debugging target failed
    #[error("Failed to connect to debugging target: {message}")]
    ConnectionFailed {
        /// Error message
        message: String,
    },

    /// The debugging connection closed while a command was pending
    #[error("Debugging connection closed")]
    ConnectionClosed,

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl CoverageError {
    /// Create a protocol command error
    #[must_use]
    pub fn protocol(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolCommand {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create an invalid payload error
    #[must_use]
    pub fn invalid_payload(context: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidPayload {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from the target rejecting or dropping a command
    #[must_use]
    pub const fn is_protocol_failure(&self) -> bool {
        matches!(
            self,
            Self::ProtocolCommand { .. } | Self::ConnectionClosed | Self::ConnectionFailed { .. }
        )
    }
}
