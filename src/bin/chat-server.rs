//! Chat server demo.
//!
//! Answers `SayHello` calls from the chat client on port 9003.

use anyhow::{Context, Result};
use chanpool::{serve, ServerCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;

const LISTEN_ADDR: &str = "0.0.0.0:9003";

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    body: String,
}

async fn handle(call: ServerCall) -> Result<Value, String> {
    match call.method.as_str() {
        "/chat.ChatService/SayHello" => {
            let message: Message =
                serde_json::from_value(call.params).map_err(|e| e.to_string())?;
            info!(
                connection = call.connection,
                client_id = ?call.client_id,
                body = %message.body,
                "Received message from client"
            );

            serde_json::to_value(Message {
                body: "Hi from server!".to_string(),
            })
            .map_err(|e| e.to_string())
        }
        other => Err(format!("unknown method {other}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Trying to start server");
    let listener = TcpListener::bind(LISTEN_ADDR)
        .await
        .with_context(|| format!("Failed to listen on {LISTEN_ADDR}"))?;

    serve(listener, handle)
        .await
        .with_context(|| format!("Failed to serve on {LISTEN_ADDR}"))?;

    Ok(())
}
