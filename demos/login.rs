//! Login demo - single session against a local gateway.
//!
//! This example demonstrates:
//! - Connecting and handshaking with the builder API
//! - Issuing a correlated request and printing its response
//! - Watching lifecycle events
//!
//! Run with: `cargo run --example login -- ws://127.0.0.1:3010`

use pylon_client::Session;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:3010".to_string());

    let session = Session::builder(&url)
        .user(json!({"client": "login-demo"}))
        .connect()
        .await?;
    println!("handshake payload: {}", session.handshake_payload());

    let mut events = session.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {event:?}");
        }
    });

    let reply = session
        .request("connector.entry.enter", &json!({"name": "demo"}))
        .await?;
    println!("enter reply: {reply}");

    session.close().await;
    Ok(())
}
