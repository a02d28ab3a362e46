//! Client facade over a [`ConnectionPool`].

use chanpool_core::{ClientConfig, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::pool::{ConnectionPool, PoolOptions};
use crate::transport::DialOptions;

/// RPC client backed by a pool of channels to `config.target`.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    pool: ConnectionPool,
}

impl Client {
    /// Validates `config` and dials the pool with the TCP transport.
    ///
    /// The config's client id is sent with every call unless
    /// `dial_options` already carries one.
    pub async fn connect(config: ClientConfig, dial_options: DialOptions) -> Result<Self> {
        let dial_options = match dial_options.client_id {
            Some(_) => dial_options,
            None => dial_options.with_client_id(config.client_id.clone()),
        };
        let options = PoolOptions::from(&config).dial_options(dial_options);
        Self::with_options(config, options).await
    }

    /// Validates `config` and dials the pool with explicit pool options.
    pub async fn with_options(config: ClientConfig, options: PoolOptions) -> Result<Self> {
        config.validate()?;

        let pool = ConnectionPool::new(config.target.clone(), options).await?;
        info!(
            name = %config.name,
            client_id = %config.client_id,
            addr = %config.target,
            "Client connected"
        );

        Ok(Self { config, pool })
    }

    pub async fn invoke<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.pool.invoke(method, request).await
    }

    pub async fn invoke_raw(&self, method: &str, request: Value) -> Result<Value> {
        self.pool.invoke_raw(method, request).await
    }

    pub fn new_stream(&self, method: &str) -> Result<()> {
        self.pool.new_stream(method)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub async fn close(&self) -> Result<()> {
        self.pool.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::{serve, ServerCall};
    use chanpool_core::PoolError;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = ClientConfig::builder().target("127.0.0.1:1").build();
        config.request_timeout = Duration::ZERO;

        let result = Client::connect(config, DialOptions::default()).await;
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::builder().target(addr.to_string()).build();
        let result = Client::connect(config, DialOptions::default()).await;
        assert!(matches!(result, Err(PoolError::NoConnections { .. })));
    }

    #[tokio::test]
    async fn test_client_sends_config_client_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, |call: ServerCall| async move {
            Ok::<_, String>(json!({ "client_id": call.client_id }))
        }));

        let config = ClientConfig::builder()
            .target(addr.to_string())
            .client_id("client-42")
            .pool_size(2)
            .build();
        let client = Client::connect(config, DialOptions::default()).await.unwrap();

        assert_eq!(client.pool().len(), 2);
        let response = client.invoke_raw("/test/Whoami", Value::Null).await.unwrap();
        assert_eq!(response["client_id"], "client-42");
        assert!(client.new_stream("/test/Stream").is_err());

        client.close().await.unwrap();
        server.abort();
    }
}
