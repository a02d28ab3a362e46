//! # chanpool core
//!
//! Core types, error handling, and configuration for the chanpool RPC channel pool.
//!
//! This crate provides the foundational building blocks shared by the pool
//! and by transport implementations:
//!
//! - **Types**: `ConnectivityState` reported by channels and the `DialFailure`
//!   record the pool keeps for its most recent failed dial.
//! - **Errors**: `thiserror` enums for every failure mode of the pool and of
//!   the transport underneath it.
//! - **Configuration**: `ClientConfig` and its builder, with defaults filled in
//!   for anything left unset.
//!
//! ## Example
//!
//! ```
//! use chanpool_core::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .name("chat-client")
//!     .target("127.0.0.1:9003")
//!     .pool_size(3)
//!     .max_lifetime(Duration::from_secs(120))
//!     .lifetime_jitter(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.pool_size, 3);
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ConfigError, PoolError, Result, TransportError};
pub use types::{ConnectivityState, DialFailure};
