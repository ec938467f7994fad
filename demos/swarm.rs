//! Swarm demo - many independent sessions for load generation.
//!
//! Each session owns its transport, codec state and request counter, so the
//! only thing the swarm shares is the target URL. The identity offset lands
//! in every session's tracing span, which keeps interleaved logs legible.
//!
//! Run with: `cargo run --example swarm -- ws://127.0.0.1:3010 50 0`
//! (url, session count, identity offset)

use std::sync::Arc;
use std::time::Duration;

use pylon_client::session::RequestMonitor;
use pylon_client::Session;
use serde_json::json;

/// Prints request latencies per route and id.
struct StdoutMonitor;

impl RequestMonitor for StdoutMonitor {
    fn on_start(&self, route: &str, req_id: u32) {
        tracing::info!(route, req_id, "request start");
    }

    fn on_end(&self, route: &str, req_id: u32) {
        tracing::info!(route, req_id, "request end");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:3010".to_string());
    let count: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(10);
    let offset: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(0);

    let monitor = Arc::new(StdoutMonitor);
    let mut tasks = Vec::with_capacity(count as usize);

    for i in 0..count {
        let ident = offset + i;
        let url = url.clone();
        let monitor = monitor.clone();

        tasks.push(tokio::spawn(async move {
            let session = Session::builder(&url)
                .ident(ident)
                .user(json!({"seat": ident}))
                .auto_reconnect(true)
                .monitor(monitor)
                .connect()
                .await?;

            let mut pushes = session.pushes();
            tokio::spawn(async move {
                while let Ok(push) = pushes.recv().await {
                    tracing::info!(route = %push.route, body = %push.body, "push");
                }
            });

            session
                .request("connector.entry.enter", &json!({"seat": ident}))
                .await?;

            for round in 0..5u32 {
                session
                    .notify("room.chat.say", &json!({"text": format!("hello {round}")}))
                    .await?;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            session.close().await;
            Ok::<_, pylon_client::PylonError>(())
        }));
    }

    for task in tasks {
        task.await??;
    }

    Ok(())
}
