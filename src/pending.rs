//! Correlation table for in-flight requests.
//!
//! Maps an outstanding request id to the waiting caller and to the route the
//! request was sent on — the response does not repeat the route, so body
//! decoding needs it back. Lookup is destructive: resolving an id removes the
//! entry, which is what gives each request at-most-once delivery even under
//! duplicate or stray response ids.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::Result;

/// Reply channel back to a waiting caller.
pub type ReplySender = oneshot::Sender<Result<Value>>;

/// An outstanding request.
#[derive(Debug)]
pub struct Pending {
    /// Route the request was sent on; drives response body decoding.
    pub route: String,
    /// Waiting caller. Dropping it resolves the caller with a closed error.
    pub reply: ReplySender,
}

/// Table of outstanding requests keyed by request id.
///
/// Ids are unique among outstanding entries by construction: the session's
/// request counter is monotonic for the lifetime of the session object and is
/// not reset across reconnects.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<u32, Pending>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly sent request.
    pub fn track(&mut self, id: u32, route: String, reply: ReplySender) {
        let previous = self.entries.insert(id, Pending { route, reply });
        debug_assert!(previous.is_none(), "request id {} reused while pending", id);
    }

    /// Resolve an id, removing its entry. `None` for unknown ids — a normal
    /// race (stray or duplicate response), not a fault.
    pub fn resolve(&mut self, id: u32) -> Option<Pending> {
        self.entries.remove(&id)
    }

    /// Drop a tracked entry without resolving it.
    pub fn remove(&mut self, id: u32) {
        self.entries.remove(&id);
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
