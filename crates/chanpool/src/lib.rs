//! chanpool
//!
//! Client-side pool of long-lived RPC channels to a single target. Calls are
//! routed to a healthy channel, channels are replaced when they expire or
//! fail, and a background task repairs the pool independently of callers.
//!
//! # Architecture
//!
//! ```text
//!   caller ──► ConnectionPool::invoke
//!                    │
//!          ┌─────────▼──────────┐
//!          │  Selector          │  picks a slot (round-robin by default)
//!          │  (selector.rs)     │
//!          └─────────┬──────────┘
//!                    │ healthy? ── no ──► next healthy slot
//!                    │                    └─ none ──► repair selected slot
//!          ┌─────────▼──────────┐
//!          │ ManagedConnection  │  channel + created_at + jittered expiry
//!          │ (connection.rs)    │
//!          └─────────┬──────────┘
//!                    │
//!          ┌─────────▼──────────┐        ┌────────────────────┐
//!          │ Channel / Dialer   │◄───────┤  Refresher         │
//!          │ (transport.rs,     │ redial │  (refresher.rs)    │
//!          │  tcp.rs)           │        │  periodic sweep    │
//!          └────────────────────┘        └────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use chanpool::{Client, DialOptions};
//! use chanpool_core::ClientConfig;
//! use serde_json::json;
//!
//! # async fn example() -> chanpool_core::Result<()> {
//! let config = ClientConfig::builder()
//!     .target("127.0.0.1:9003")
//!     .pool_size(3)
//!     .build();
//!
//! let client = Client::connect(config, DialOptions::default()).await?;
//! let reply: serde_json::Value = client
//!     .invoke("/chat.ChatService/SayHello", &json!({ "body": "hi" }))
//!     .await?;
//! println!("{reply}");
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod metrics;
pub mod pool;
pub mod refresher;
pub mod selector;
pub mod tcp;
pub mod transport;

pub use client::Client;
pub use connection::{lifetime_with_jitter, ManagedConnection};
pub use metrics::{PoolMetrics, PoolStats};
pub use pool::{ConnectionPool, PoolOptions};
pub use refresher::{Refresher, DEFAULT_REFRESH_INTERVAL};
pub use selector::{LeastRecentlyUsed, RandomSelector, RoundRobin, Selector};
pub use tcp::{serve, ServerCall, TcpChannel, TcpDialer};
pub use transport::{Channel, DialOptions, Dialer};
