//! MsgPack schema codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`! Gateway peers
//! decode struct-as-map format; `to_vec` would emit positional arrays and
//! break interop with JSON-shaped payloads on the other side.

use std::collections::HashSet;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::Result;
use crate::handshake::ProtoBundle;

use super::SchemaCodec;

/// MessagePack codec for schema-covered routes.
///
/// The handshake's proto bundle names which routes are binary-coded on each
/// side; the schema details themselves are not needed here because MsgPack is
/// self-describing. Route sets are swapped wholesale on reconfiguration.
#[derive(Debug, Default)]
pub struct MessagePackCodec {
    encode_routes: RwLock<HashSet<String>>,
    decode_routes: RwLock<HashSet<String>>,
}

impl MessagePackCodec {
    /// Create an unconfigured codec (covers no routes until a handshake).
    pub fn new() -> Self {
        Self::default()
    }
}

fn route_set(schemas: &Value) -> HashSet<String> {
    match schemas.as_object() {
        Some(map) => map.keys().cloned().collect(),
        None => HashSet::new(),
    }
}

impl SchemaCodec for MessagePackCodec {
    fn configure(&self, protos: &ProtoBundle) {
        *self.encode_routes.write().expect("codec lock poisoned") = route_set(&protos.client);
        *self.decode_routes.write().expect("codec lock poisoned") = route_set(&protos.server);
    }

    fn encodes(&self, route: &str) -> bool {
        self.encode_routes
            .read()
            .expect("codec lock poisoned")
            .contains(route)
    }

    fn decodes(&self, route: &str) -> bool {
        self.decode_routes
            .read()
            .expect("codec lock poisoned")
            .contains(route)
    }

    fn encode(&self, _route: &str, body: &Value) -> Result<Vec<u8>> {
        // CRITICAL: to_vec_named, NOT to_vec!
        Ok(rmp_serde::to_vec_named(body)?)
    }

    fn decode(&self, _route: &str, body: &[u8]) -> Result<Value> {
        Ok(rmp_serde::from_slice(body)?)
    }
}
