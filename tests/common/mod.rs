//! Common test utilities and helpers for integration tests

use chanpool::{serve, ServerCall};
use chanpool_core::TransportError;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ECHO: &str = "/test.EchoService/Echo";
pub const SLOW: &str = "/test.EchoService/Slow";

/// A running test target
pub struct TestTarget {
    pub addr: SocketAddr,
    task: JoinHandle<Result<(), TransportError>>,
}

impl TestTarget {
    pub fn target(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for TestTarget {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(call: ServerCall) -> Result<Value, String> {
    match call.method.as_str() {
        ECHO => Ok(json!({
            "connection": call.connection,
            "client_id": call.client_id,
            "params": call.params,
        })),
        SLOW => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(json!({ "connection": call.connection }))
        }
        other => Err(format!("unknown method {other}")),
    }
}

/// Starts a target on an ephemeral port that answers every echo call with
/// the sequence number of the connection it arrived on.
pub async fn start_target() -> TestTarget {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test target");
    let addr = listener.local_addr().expect("Failed to read local address");
    let task = tokio::spawn(serve(listener, handle));

    TestTarget { addr, task }
}

/// Connection sequence number reported by the target.
pub fn connection_of(response: &Value) -> u64 {
    response["connection"]
        .as_u64()
        .expect("Response carries no connection number")
}
