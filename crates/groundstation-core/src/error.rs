//! Error types for the ground station core
//!
//! Transport failures carry enough context (channel, host, port, underlying
//! code) to be logged once and then handed back to the host unchanged.
//! Validation problems are not errors: they are reported as issue strings
//! through [`crate::traits::Validatable`].

use thiserror::Error;

/// Result type alias for ground station operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the ground station system
#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level failure reaching a channel or device endpoint
    #[error("Connection to {host}:{port} failed: {code}: {message}")]
    Connection {
        /// Endpoint host
        host: String,
        /// Endpoint port
        port: u16,
        /// Underlying error code (io error kind, TLS, timeout)
        code: String,
        /// Underlying error message
        message: String,
    },

    /// Credentials rejected by a channel endpoint
    #[error("User {username} failed to authenticate with {host}:{port}")]
    Authentication {
        /// Username presented to the endpoint
        username: String,
        /// Endpoint host
        host: String,
        /// Endpoint port
        port: u16,
    },

    /// Send or publish failure not otherwise classified
    #[error("Transport error ({channel}): {message}")]
    Transport {
        /// Channel name ("email", "mqtt")
        channel: String,
        /// Error message
        message: String,
    },

    /// Operation aborted through the caller's cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Telemetry (device polling) errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Invalid input or call order
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Secret sealing/opening errors
    #[error("Secret error: {0}")]
    Secret(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a connection error
    pub fn connection(
        host: impl Into<String>,
        port: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Connection {
            host: host.into(),
            port,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(username: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::Authentication {
            username: username.into(),
            host: host.into(),
            port,
        }
    }

    /// Create a transport error
    pub fn transport(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a telemetry error
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a secret error
    pub fn secret(msg: impl Into<String>) -> Self {
        Self::Secret(msg.into())
    }

    /// Whether this error is the cancellation failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
