//! Body codecs for application payloads.
//!
//! Plain bodies travel as UTF-8 JSON. Routes covered by the handshake's
//! schema bundle instead go through a [`SchemaCodec`] — an opaque,
//! route-keyed structured/binary encoding. The codec is pluggable; the crate
//! ships [`MessagePackCodec`] as the compact binary implementation.
//!
//! # Example
//!
//! ```
//! use pylon_client::codec::{MessagePackCodec, SchemaCodec};
//! use pylon_client::handshake::ProtoBundle;
//! use serde_json::json;
//!
//! let codec = MessagePackCodec::new();
//! codec.configure(&ProtoBundle {
//!     version: 1,
//!     client: json!({"chat.send": {}}),
//!     server: json!({}),
//! });
//!
//! assert!(codec.encodes("chat.send"));
//! assert!(!codec.encodes("other.route"));
//! ```

mod cache;
mod msgpack;

pub use cache::ProtoCache;
pub use msgpack::MessagePackCodec;

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::dict::RouteDict;
use crate::error::Result;
use crate::handshake::ProtoBundle;
use crate::protocol::{encode_message, MessageKind, RouteRef};

/// A structured/binary body codec keyed by route name.
///
/// Reconfigured from the schema bundle on every successful handshake. A route
/// the codec does not cover falls back to JSON, matching the server's own
/// per-route selection. Implementations use interior mutability: the session
/// holds the codec behind an `Arc` and reconfigures it in place.
pub trait SchemaCodec: Send + Sync {
    /// Adopt a freshly negotiated schema bundle, replacing any prior state.
    fn configure(&self, protos: &ProtoBundle);

    /// Whether outbound bodies on this route use the codec.
    fn encodes(&self, route: &str) -> bool;

    /// Whether inbound bodies on this route use the codec.
    fn decodes(&self, route: &str) -> bool;

    /// Encode a body for a covered route.
    fn encode(&self, route: &str, body: &Value) -> Result<Vec<u8>>;

    /// Decode a body for a covered route.
    fn decode(&self, route: &str, body: &[u8]) -> Result<Value>;
}

/// The negotiated message codec: route compression plus per-route body codec
/// selection. Rebuilt from scratch on every successful handshake, discarding
/// the previous dictionary and schema state.
pub struct MessageCodec {
    dict: RouteDict,
    schemas: Option<Arc<dyn SchemaCodec>>,
}

impl MessageCodec {
    /// Codec with no negotiated state: plain JSON bodies, verbatim routes.
    pub fn plain() -> Self {
        Self {
            dict: RouteDict::empty(),
            schemas: None,
        }
    }

    /// Codec from freshly negotiated handshake state.
    pub fn new(dict: RouteDict, schemas: Option<Arc<dyn SchemaCodec>>) -> Self {
        Self { dict, schemas }
    }

    /// The negotiated route dictionary.
    pub fn dict(&self) -> &RouteDict {
        &self.dict
    }

    /// Encode an outbound message: REQUEST when `req_id != 0`, NOTIFY
    /// otherwise. The body goes through the schema codec when it covers the
    /// route's encode side, else UTF-8 JSON; the route is replaced by its
    /// dictionary code when one is negotiated.
    pub fn encode(&self, req_id: u32, route: &str, body: &Value) -> Result<Bytes> {
        let kind = if req_id != 0 {
            MessageKind::Request
        } else {
            MessageKind::Notify
        };

        let raw = match &self.schemas {
            Some(codec) if codec.encodes(route) => codec.encode(route, body)?,
            _ => serde_json::to_vec(body)?,
        };

        let route_ref = match self.dict.compress(route) {
            Some(code) => RouteRef::Code(code),
            None => RouteRef::Name(route.to_string()),
        };

        encode_message(kind, req_id, Some(&route_ref), &raw)
    }

    /// Recover the route string for an inbound wire route. `None` when a
    /// compressed code has no reverse mapping.
    pub fn expand_route(&self, route: &RouteRef) -> Option<String> {
        match route {
            RouteRef::Name(name) => Some(name.clone()),
            RouteRef::Code(code) => self.dict.expand(*code).map(str::to_string),
        }
    }

    /// Decode an inbound body with the same selection rule as encoding, in
    /// the inverse direction. An empty body degrades to JSON null.
    pub fn decode_body(&self, route: &str, raw: &[u8]) -> Result<Value> {
        if let Some(codec) = &self.schemas {
            if codec.decodes(route) {
                return codec.decode(route, raw);
            }
        }
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(raw)?)
    }
}
