//! End-to-end tests of the pool against a live TCP target

mod common;

use chanpool::{Client, ConnectionPool, DialOptions, PoolOptions};
use chanpool_core::{ClientConfig, PoolError};
use common::{connection_of, start_target, ECHO, SLOW};
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn test_size_three_pool_uses_three_channels_in_order() {
    let target = start_target().await;
    let config = ClientConfig::builder()
        .name("smoke")
        .target(target.target())
        .pool_size(3)
        .build();

    let client = Client::connect(config, DialOptions::default())
        .await
        .expect("Failed to connect");
    assert_eq!(client.pool().len(), 3);

    let mut first_cycle = Vec::new();
    for _ in 0..3 {
        let response = client.invoke_raw(ECHO, json!({ "body": "hi" })).await.unwrap();
        assert_eq!(response["params"]["body"], "hi");
        first_cycle.push(connection_of(&response));
    }

    let distinct: HashSet<u64> = first_cycle.iter().copied().collect();
    assert_eq!(distinct.len(), 3);

    let mut second_cycle = Vec::new();
    for _ in 0..3 {
        let response = client.invoke_raw(ECHO, Value::Null).await.unwrap();
        second_cycle.push(connection_of(&response));
    }
    assert_eq!(second_cycle, first_cycle);

    client.close().await.unwrap();
    assert!(matches!(client.close().await, Err(PoolError::AlreadyClosed)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_id_reaches_target() {
    let target = start_target().await;
    let config = ClientConfig::builder()
        .target(target.target())
        .client_id("smoke-client")
        .build();

    let client = Client::connect(config, DialOptions::default()).await.unwrap();
    let response = client.invoke_raw(ECHO, Value::Null).await.unwrap();
    assert_eq!(response["client_id"], "smoke-client");

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_closed_channel_is_routed_around_and_replaced() -> anyhow::Result<()> {
    let target = start_target().await;
    let pool = ConnectionPool::new(
        target.target(),
        PoolOptions::new()
            .pool_size(2)
            .refresh_interval(Duration::from_secs(3600)),
    )
    .await?;

    // Close slot 0's channel underneath the pool
    pool.connections()[0].channel().close().await?;
    assert!(!pool.connections()[0].is_healthy());

    for _ in 0..4 {
        pool.invoke_raw(ECHO, Value::Null).await?;
    }
    assert!(pool.stats().fallbacks >= 2);

    assert_eq!(pool.refresh_now().await?, 1);
    assert!(pool.connections()[0].is_healthy());

    let mut seen = HashSet::new();
    for _ in 0..2 {
        seen.insert(connection_of(&pool.invoke_raw(ECHO, Value::Null).await?));
    }
    // Connections 0 and 1 were the initial dials, the replacement is 2
    assert!(seen.contains(&2));

    pool.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_timeout_bounds_the_call() {
    let target = start_target().await;
    let config = ClientConfig::builder()
        .target(target.target())
        .pool_size(2)
        .request_timeout(Duration::from_millis(100))
        .build();

    let client = Client::connect(config, DialOptions::default()).await.unwrap();

    let err = client.invoke_raw(SLOW, Value::Null).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout { .. }));
    assert!(err.is_retryable());

    // The slow call still occupies its connection, the next one goes to the other
    client.invoke_raw(ECHO, Value::Null).await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_calls_share_the_pool() {
    let target = start_target().await;
    let pool = ConnectionPool::new(target.target(), PoolOptions::new().pool_size(3))
        .await
        .unwrap();

    let calls = (0..50).map(|i| pool.invoke_raw(ECHO, json!({ "n": i })));
    let responses = join_all(calls).await;

    let mut connections = HashSet::new();
    for (i, response) in responses.into_iter().enumerate() {
        let response = response.unwrap();
        assert_eq!(response["params"]["n"], i);
        connections.insert(connection_of(&response));
    }
    assert_eq!(connections.len(), 3);
    assert_eq!(pool.stats().invocations, 50);

    pool.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_method_surfaces_remote_error() {
    let target = start_target().await;
    let pool = ConnectionPool::new(target.target(), PoolOptions::new())
        .await
        .unwrap();

    let err = pool
        .invoke_raw("/test.EchoService/Missing", Value::Null)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown method"));
    assert!(!err.is_retryable());

    pool.close().await.unwrap();
}
