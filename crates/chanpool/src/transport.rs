//! Transport seam between the pool and the RPC stack underneath it.
//!
//! The pool never dials or frames anything itself. It asks a [`Dialer`] for
//! channels and drives them through the [`Channel`] trait, so any transport
//! that can report its connectivity state can be pooled.

use async_trait::async_trait;
use chanpool_core::{ConnectivityState, TransportError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// An established, reusable connection to the RPC target.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Stable identifier of this channel, used in logs.
    fn id(&self) -> Uuid;

    /// Performs a unary call.
    ///
    /// # Arguments
    /// * `method` - Fully qualified method name
    /// * `request` - Request payload
    ///
    /// # Returns
    /// * `Ok(Value)` with the response payload
    /// * `Err` if the channel or the remote side failed the call
    async fn invoke(&self, method: &str, request: Value) -> Result<Value, TransportError>;

    /// Current connectivity state. Must be cheap; it is read on every call.
    fn state(&self) -> ConnectivityState;

    /// Closes the channel and releases its resources.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Creates channels to a target.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Dials `target` and returns a ready-to-use channel.
    async fn dial(
        &self,
        target: &str,
        options: &DialOptions,
    ) -> Result<Arc<dyn Channel>, TransportError>;
}

/// Options passed through to the dialer on every dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialOptions {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
    /// TCP keepalive interval (None = keepalive disabled)
    pub keepalive: Option<Duration>,
    /// Identifier presented to the target
    pub client_id: Option<String>,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            nodelay: true,
            keepalive: Some(Duration::from_secs(30)),
            client_id: None,
        }
    }
}

impl DialOptions {
    /// Sets the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the client id presented to the target.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the TCP keepalive interval.
    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }
}
