//! Session facade: the externally visible API.
//!
//! One [`Session`] per logical connection. All protocol state lives in the
//! session's driver task and is reached over a command channel, so any number
//! of independent sessions run fully in parallel with no shared mutable
//! state between them.
//!
//! # Example
//!
//! ```ignore
//! use pylon_client::Session;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::builder("ws://127.0.0.1:3010")
//!         .user(json!({"token": "abc"}))
//!         .auto_reconnect(true)
//!         .connect()
//!         .await?;
//!
//!     let reply = session.request("connector.entry.enter", &json!({"name": "rin"})).await?;
//!     println!("entered: {reply}");
//!     session.close().await;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::Instrument;

use crate::codec::SchemaCodec;
use crate::driver::{Driver, DriverConfig};
use crate::error::{PylonError, Result};
use crate::events::{EventHub, PushMessage, SessionEvent};
use crate::transport::{Connector, WsConnector};

/// Command channel depth between the handle and the driver.
const COMMAND_CAPACITY: usize = 64;

/// Observer for request lifecycles, keyed by route and request id. Hosts use
/// this to feed latency instrumentation; the session itself never interprets
/// the calls.
pub trait RequestMonitor: Send + Sync {
    /// A request frame went out.
    fn on_start(&self, route: &str, req_id: u32);
    /// The correlated response resolved.
    fn on_end(&self, route: &str, req_id: u32);
}

/// Commands from the session handle to its driver.
pub(crate) enum Command {
    Request {
        route: String,
        body: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    Notify {
        route: String,
        body: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// Builder for configuring and connecting a session.
pub struct SessionBuilder {
    url: String,
    user: Value,
    auto_reconnect: bool,
    ident: u64,
    schema_codec: Option<Arc<dyn SchemaCodec>>,
    proto_cache: Option<PathBuf>,
    monitor: Option<Arc<dyn RequestMonitor>>,
    connector: Arc<dyn Connector>,
}

impl SessionBuilder {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            user: Value::Object(serde_json::Map::new()),
            auto_reconnect: false,
            ident: 0,
            schema_codec: None,
            proto_cache: None,
            monitor: None,
            connector: Arc::new(WsConnector),
        }
    }

    /// Application payload carried in the handshake's `user` section.
    pub fn user(mut self, user: Value) -> Self {
        self.user = user;
        self
    }

    /// Reconnect automatically after an unexpected close (fixed 1 s backoff).
    /// Off by default.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Numeric identity for log correlation and instrumentation. Never sent
    /// on the wire.
    pub fn ident(mut self, ident: u64) -> Self {
        self.ident = ident;
        self
    }

    /// Structured/binary body codec for schema-covered routes.
    pub fn schema_codec(mut self, codec: Arc<dyn SchemaCodec>) -> Self {
        self.schema_codec = Some(codec);
        self
    }

    /// File for persisting negotiated schema metadata across runs.
    pub fn proto_cache(mut self, path: PathBuf) -> Self {
        self.proto_cache = Some(path);
        self
    }

    /// Request start/end observer.
    pub fn monitor(mut self, monitor: Arc<dyn RequestMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replace the transport connector (tests, alternative sockets).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Open the connection and run the handshake. Resolves once the session
    /// is ready (or with the handshake failure; there is no automatic retry
    /// of a rejected handshake).
    pub async fn connect(self) -> Result<Session> {
        let hub = Arc::new(EventHub::new());
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (init_tx, init_rx) = oneshot::channel();

        let ident = self.ident;
        let driver = Driver::new(
            DriverConfig {
                url: self.url,
                user: self.user,
                auto_reconnect: self.auto_reconnect,
                connector: self.connector,
                schema_codec: self.schema_codec,
                proto_cache: self.proto_cache,
                monitor: self.monitor,
            },
            hub.clone(),
            cmd_rx,
        );

        let span = tracing::info_span!("session", ident);
        tokio::spawn(driver.run(init_tx).instrument(span));

        let handshake_payload = init_rx.await.map_err(|_| PylonError::ConnectionClosed)??;

        Ok(Session {
            cmd_tx,
            hub,
            handshake_payload,
            ident,
        })
    }
}

/// A connected session.
pub struct Session {
    cmd_tx: mpsc::Sender<Command>,
    hub: Arc<EventHub>,
    handshake_payload: Value,
    ident: u64,
}

impl Session {
    /// Start configuring a session against `url`.
    pub fn builder(url: &str) -> SessionBuilder {
        SessionBuilder::new(url)
    }

    /// Issue a request and suspend until the correlated response arrives.
    ///
    /// There is no per-request timeout: the future resolves when a response
    /// with the matching id arrives, or with `ConnectionClosed` if the
    /// session is torn down first. Wrap in `tokio::time::timeout` for a
    /// deadline.
    pub async fn request(&self, route: &str, body: &Value) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request {
                route: route.to_string(),
                body: body.clone(),
                reply,
            })
            .await
            .map_err(|_| PylonError::ConnectionClosed)?;
        rx.await.map_err(|_| PylonError::ConnectionClosed)?
    }

    /// Fire-and-forget notification (request id 0, never tracked).
    pub async fn notify(&self, route: &str, body: &Value) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Notify {
                route: route.to_string(),
                body: body.clone(),
                reply,
            })
            .await
            .map_err(|_| PylonError::ConnectionClosed)?;
        rx.await.map_err(|_| PylonError::ConnectionClosed)?
    }

    /// Close the session: cancels timers, detaches the transport, never
    /// reconnects. Safe to call any number of times.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.hub.subscribe()
    }

    /// Subscribe to every push message.
    pub fn pushes(&self) -> broadcast::Receiver<PushMessage> {
        self.hub.subscribe_pushes()
    }

    /// Subscribe to pushes on one route.
    pub fn on(&self, route: &str) -> broadcast::Receiver<Value> {
        self.hub.subscribe_route(route)
    }

    /// The server's `user` payload from the most recent successful handshake
    /// at connect time.
    pub fn handshake_payload(&self) -> &Value {
        &self.handshake_payload
    }

    /// The identity this session was built with.
    pub fn ident(&self) -> u64 {
        self.ident
    }
}
