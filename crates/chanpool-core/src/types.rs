//! Shared types for channels and the pool that manages them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity state reported by a channel.
///
/// Mirrors the lifecycle an RPC channel goes through: it starts `Idle`,
/// moves to `Connecting`, settles in `Ready`, and may drop to
/// `TransientFailure` before it is finally `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectivityState {
    /// Channel exists but has no active connection
    Idle,
    /// Channel is establishing a connection
    Connecting,
    /// Channel is connected and accepting calls
    Ready,
    /// Channel lost its connection and may recover
    TransientFailure,
    /// Channel has been closed
    Shutdown,
}

impl ConnectivityState {
    /// Returns true if a channel in this state can serve calls right now.
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectivityState::Ready)
    }

    /// Returns true if a background sweep should replace a channel in this state.
    ///
    /// `Connecting` is deliberately excluded: the channel is on its way up.
    pub fn needs_refresh(&self) -> bool {
        matches!(
            self,
            ConnectivityState::Shutdown
                | ConnectivityState::TransientFailure
                | ConnectivityState::Idle
        )
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Idle => write!(f, "IDLE"),
            ConnectivityState::Connecting => write!(f, "CONNECTING"),
            ConnectivityState::Ready => write!(f, "READY"),
            ConnectivityState::TransientFailure => write!(f, "TRANSIENT_FAILURE"),
            ConnectivityState::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

/// Record of the most recent failed dial.
///
/// Overwritten on every new failure and readable by any caller of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialFailure {
    /// Error message reported by the dialer
    pub message: String,
    /// When the failure happened
    pub occurred_at: DateTime<Utc>,
}

impl DialFailure {
    /// Records a failure that happened just now.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl fmt::Display for DialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.message, self.occurred_at.to_rfc3339())
    }
}
