//! # pylon-client
//!
//! Rust client runtime for the Pylon gateway protocol: request/response plus
//! server push over a single WebSocket connection.
//!
//! Each [`Session`] independently drives the full protocol lifecycle —
//! connect, handshake, steady-state traffic, heartbeat liveness, reconnect —
//! which makes the crate suitable for spinning up many simulated clients at
//! once (load generation) as well as for single-client use.
//!
//! ## Architecture
//!
//! - **Control plane** (JSON): handshake negotiation — heartbeat interval,
//!   route-compression dictionary, per-route schema bundle.
//! - **Data plane** (binary): framed packets carrying JSON or schema-coded
//!   messages, correlated by request id.
//!
//! ## Example
//!
//! ```ignore
//! use pylon_client::Session;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::builder("ws://127.0.0.1:3010")
//!         .user(json!({"token": "abc"}))
//!         .connect()
//!         .await?;
//!
//!     let reply = session.request("connector.entry.enter", &json!({})).await?;
//!     println!("{reply}");
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod dict;
pub mod error;
pub mod events;
pub mod handshake;
pub mod heartbeat;
pub mod pending;
pub mod protocol;
pub mod session;
pub mod transport;

mod driver;

pub use error::{PylonError, Result};
pub use events::{PushMessage, SessionEvent};
pub use session::{RequestMonitor, Session, SessionBuilder};
