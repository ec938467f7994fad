//! Session event hub.
//!
//! Subscribers attach to three surfaces: the lifecycle event stream, the
//! generic push stream, and per-route push streams. Broadcast semantics —
//! every event fans out to all current subscribers; events with no
//! subscribers are dropped, which keeps emission non-blocking for sessions
//! nobody is watching.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;

/// Per-channel buffer depth. A subscriber that falls further behind than
/// this observes a `Lagged` error from the broadcast receiver.
const CHANNEL_CAPACITY: usize = 64;

/// Lifecycle events observable on a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Handshake rejection or other unrecoverable protocol fault.
    Error(String),
    /// Transport-level failure; the session follows the close path.
    IoError(String),
    /// Liveness deadline lapsed; the transport is being torn down.
    HeartbeatTimeout,
    /// The connection closed (clean or not).
    Close,
    /// The server evicted this session; the payload is its reason.
    Kick(Value),
    /// A reconnect attempt is starting.
    Reconnect {
        /// Consecutive failed-connection counter, reset on success.
        attempt: u32,
    },
    /// A reconnect attempt completed its handshake.
    Reconnected,
}

/// An unsolicited server message.
#[derive(Debug, Clone)]
pub struct PushMessage {
    /// Route the server addressed.
    pub route: String,
    /// Decoded body.
    pub body: Value,
}

/// Fan-out registry shared between a session handle and its driver.
pub struct EventHub {
    events: broadcast::Sender<SessionEvent>,
    pushes: broadcast::Sender<PushMessage>,
    routes: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl EventHub {
    /// Create a hub with no subscribers.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (pushes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            events,
            pushes,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Subscribe to every push message.
    pub fn subscribe_pushes(&self) -> broadcast::Receiver<PushMessage> {
        self.pushes.subscribe()
    }

    /// Subscribe to pushes on one route.
    pub fn subscribe_route(&self, route: &str) -> broadcast::Receiver<Value> {
        let mut routes = self.routes.lock().expect("event hub lock poisoned");
        routes
            .entry(route.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Emit a lifecycle event.
    pub(crate) fn emit(&self, event: SessionEvent) {
        tracing::debug!(event = ?event, "session event");
        let _ = self.events.send(event);
    }

    /// Emit a push on both the generic and the route-specific stream.
    pub(crate) fn emit_push(&self, route: String, body: Value) {
        let routes = self.routes.lock().expect("event hub lock poisoned");
        if let Some(sender) = routes.get(&route) {
            let _ = sender.send(body.clone());
        }
        drop(routes);
        let _ = self.pushes.send(PushMessage { route, body });
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
