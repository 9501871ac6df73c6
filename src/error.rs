//! Application error types for fireteam-relay
//!
//! This module defines the error types shared by the proxy pool, the
//! harvest pipeline and the scheduler. All error types use `thiserror`.

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::logging::LoggingError;

/// Errors raised by a single outbound unit of work (provider call, page
/// fetch or sink delivery)
///
/// Every variant is retried by [`crate::relay::RetryPolicy`]; the variants
/// only differ in the context they carry when finally surfaced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelayError {
    /// Request exceeded the per-request timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Remote or proxy refused the connection
    #[error("Connection refused")]
    ConnectionRefused,

    /// Generic transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Transport-level HTTP status outside 2xx
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// Response was not the expected content type
    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// Payload could not be decoded or lacked required fields
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Sink answered with a non-success application status
    #[error("Rejected by sink: status {status}, msg {msg}")]
    Rejected {
        /// Application-level status reported by the sink
        status: i64,
        /// Message reported by the sink
        msg: String,
    },
}

impl RelayError {
    /// Whether the failure happened below the HTTP layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::NetworkTimeout | RelayError::ConnectionRefused | RelayError::Network(_)
        )
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::NetworkTimeout
        } else if err.is_connect() {
            RelayError::ConnectionRefused
        } else if err.is_decode() {
            RelayError::InvalidData(err.to_string())
        } else if let Some(status) = err.status() {
            RelayError::HttpStatus(status.as_u16())
        } else {
            RelayError::Network(err.to_string())
        }
    }
}

/// Application-level error type
///
/// Aggregates the domain-specific error types raised during startup; the
/// binary converts it into `anyhow::Error` at its edge.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Relay error
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Logging could not be initialised
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}
