//! Error types for the chanpool RPC channel pool.
//!
//! All errors implement `std::error::Error` and are serializable so they can
//! be logged or forwarded as structured data.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::types::DialFailure;

/// Result type alias using PoolError as the error type.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Top-level error type for pool operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum PoolError {
    /// A dial failed while repairing a slot, in the background or on the call path
    #[error("error while refreshing connection: {source}")]
    Refresh { source: TransportError },

    /// An open pool had no slots to select from.
    ///
    /// Construction never yields an empty pool and repairs only replace
    /// channels, so this guards against an empty slot list rather than an
    /// unhealthy one. Unhealthy slots are repaired on the call path instead.
    #[error("no healthy connection available")]
    NoHealthyConnection,

    /// None of the initial dials succeeded
    #[error("none of the {attempted} initial dials succeeded (last failure: {last_failure:?})")]
    NoConnections {
        attempted: usize,
        last_failure: Option<DialFailure>,
    },

    /// `close` was called on a pool that is already closed
    #[error("connection pool is already closed")]
    AlreadyClosed,

    /// The pool was closed and no longer serves calls
    #[error("connection pool is closed")]
    Closed,

    /// The background refresh job could not be started
    #[error("error while initializing background connection refresh job: {reason}")]
    SchedulerStart { reason: String },

    /// The call reached a channel but the channel failed it
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The call exceeded the request timeout
    #[error("call to {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// Request or response could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// The operation is not supported by the pool
    #[error("{operation} is not supported")]
    Unsupported { operation: String },

    /// Configuration was rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal errors that shouldn't normally occur
    #[error("internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// Wraps a dial error raised while repairing a slot.
    pub fn refresh(source: TransportError) -> Self {
        Self::Refresh { source }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a scheduler start error.
    pub fn scheduler_start(reason: impl Into<String>) -> Self {
        Self::SchedulerStart {
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PoolError::NoHealthyConnection | PoolError::Timeout { .. } => true,
            PoolError::Refresh { source: e } | PoolError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Codec(err.to_string())
    }
}

/// Errors raised by a transport while dialing or calling.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum TransportError {
    /// Failed to establish a connection
    #[error("failed to connect to {target}: {reason}")]
    ConnectFailed { target: String, reason: String },

    /// Connection attempt did not finish in time
    #[error("connection to {target} timed out after {timeout_ms}ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// Channel is not in a state that can carry calls
    #[error("channel unavailable: {state}")]
    Unavailable { state: String },

    /// Channel was closed while the call was in flight
    #[error("channel closed: {reason}")]
    Closed { reason: String },

    /// The remote side answered with an error
    #[error("remote error: {message}")]
    Remote { message: String },

    /// Frame could not be parsed or was unexpected
    #[error("protocol error: {details}")]
    Protocol { details: String },

    /// I/O failure on the underlying connection
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl TransportError {
    /// Creates a connect failed error.
    pub fn connect_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a channel closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(details: impl Into<String>) -> Self {
        Self::Protocol {
            details: details.into(),
        }
    }

    /// Creates a remote error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectFailed { .. }
                | TransportError::ConnectTimeout { .. }
                | TransportError::Unavailable { .. }
                | TransportError::Closed { .. }
                | TransportError::Io { .. }
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io {
            message: err.to_string(),
        }
    }
}

/// Errors raised while validating configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
