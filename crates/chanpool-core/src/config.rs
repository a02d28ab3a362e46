//! Client configuration for the chanpool RPC channel pool.
//!
//! `ClientConfig` is built once through `ClientConfigBuilder` and read-only
//! afterwards. Every field left unset, or set to its zero value, is replaced
//! by its default when the builder runs.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Default number of channels kept open to the target.
pub const DEFAULT_POOL_SIZE: usize = 1;

/// Default lifetime of a channel before it is replaced.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Default spread added to each channel's lifetime.
pub const DEFAULT_LIFETIME_JITTER: Duration = Duration::from_secs(30);

/// Default timeout applied to each call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default target, the wildcard bind address.
pub const DEFAULT_TARGET: &str = "0.0.0.0:0";

/// Default client name.
pub const DEFAULT_NAME: &str = "chanpool";

/// Resolved client configuration.
///
/// # Examples
///
/// ```
/// use chanpool_core::config::ClientConfig;
///
/// let config = ClientConfig::builder().target("127.0.0.1:9003").build();
/// assert_eq!(config.pool_size, 1);
/// assert_eq!(config.target, "127.0.0.1:9003");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name used in logs
    pub name: String,

    /// Address of the single remote target
    pub target: String,

    /// Identifier this client presents to the target
    pub client_id: String,

    /// Timeout applied to each individual call
    pub request_timeout: Duration,

    /// Number of channels kept open to the target
    pub pool_size: usize,

    /// Lifetime of a channel before it is replaced
    pub max_lifetime: Duration,

    /// Spread added to each channel's lifetime
    pub lifetime_jitter: Duration,
}

impl ClientConfig {
    /// Creates a new builder for ClientConfig.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::invalid_value("target", "cannot be empty"));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "request_timeout",
                "must be greater than 0",
            ));
        }

        if self.pool_size == 0 {
            return Err(ConfigError::invalid_value(
                "pool_size",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::default().build()
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    name: Option<String>,
    target: Option<String>,
    client_id: Option<String>,
    request_timeout: Option<Duration>,
    pool_size: Option<usize>,
    max_lifetime: Option<Duration>,
    lifetime_jitter: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Sets the client name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the target address.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the client id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the per-call timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the number of pooled channels.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets the channel max lifetime.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Sets the lifetime jitter standard deviation.
    pub fn lifetime_jitter(mut self, jitter: Duration) -> Self {
        self.lifetime_jitter = Some(jitter);
        self
    }

    /// Builds the ClientConfig, substituting defaults for unset or zero fields.
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            name: non_empty(self.name).unwrap_or_else(|| DEFAULT_NAME.to_string()),
            target: non_empty(self.target).unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            client_id: non_empty(self.client_id).unwrap_or_else(|| Uuid::new_v4().to_string()),
            request_timeout: non_zero(self.request_timeout).unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            pool_size: self
                .pool_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_POOL_SIZE),
            max_lifetime: non_zero(self.max_lifetime).unwrap_or(DEFAULT_MAX_LIFETIME),
            lifetime_jitter: non_zero(self.lifetime_jitter).unwrap_or(DEFAULT_LIFETIME_JITTER),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_zero(value: Option<Duration>) -> Option<Duration> {
    value.filter(|v| !v.is_zero())
}
