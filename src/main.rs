//! Chat client demo.
//!
//! Connects to the chat server through a pool of three channels and sends a
//! greeting on each of them.

use anyhow::{Context, Result};
use chanpool::{Client, DialOptions};
use chanpool_core::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

const SAY_HELLO: &str = "/chat.ChatService/SayHello";

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    body: String,
}

fn client_config() -> ClientConfig {
    ClientConfig::builder()
        .name("grpc-test")
        .target("127.0.0.1:9003")
        .pool_size(3)
        .max_lifetime(Duration::from_secs(2 * 60))
        .lifetime_jitter(Duration::from_secs(10))
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chanpool=info,chat_client=info".into()),
        )
        .init();

    let config = client_config();
    let target = config.target.clone();

    let client = Client::connect(config, DialOptions::default())
        .await
        .with_context(|| format!("Client could not connect to server on {target}"))?;

    for _ in 0..client.pool().len() {
        let request = Message {
            body: "Server! Are you there??".to_string(),
        };
        let response: Message = client
            .invoke(SAY_HELLO, &request)
            .await
            .context("Error received from server")?;

        info!(body = %response.body, "Response");
    }

    info!(stats = ?client.pool().stats(), "Pool statistics");
    client.close().await?;

    Ok(())
}
