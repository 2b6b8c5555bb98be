//! Retry with exponential backoff.
//!
//! The `/app/flaky` endpoint answers 503 twice for every success. A
//! [`RetryListener`] hides that from the application.
//!
//! Run with: cargo run --bin retry-backoff

use std::sync::Arc;
use std::time::Duration;

use rpc_wrapper::policy::{RetryContext, RetryListener, RetryPolicy};
use rpc_wrapper::{RpcClient, RpcWrapper};
use rpc_wrapper_examples::{greeting_payload, server_addr, spawn_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let addr = spawn_server(server_addr()?).await?;
    println!("=== Example: retry with exponential backoff ===");
    println!("Server listening on http://{}", addr);
    println!();

    let policy = RetryPolicy::aggressive().base_delay(Duration::from_millis(100));
    let wrapper = RpcWrapper::<RetryContext>::with_listener(Arc::new(RetryListener::new(policy)?));
    let client = wrapper.wrap(RpcClient::builder(format!("http://{}/app/flaky", addr)).build()?);

    for name in ["alice", "bob"] {
        let started = tokio::time::Instant::now();
        let response = client.call(greeting_payload(name)).await?;
        println!(
            "{} -> {} after {:?}",
            name,
            response.status(),
            started.elapsed()
        );
    }

    Ok(())
}
