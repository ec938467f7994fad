//! Handshake exchange bodies.
//!
//! The handshake is the JSON control plane of the protocol: the client opens
//! with `{sys: {type, version, protoVersion}, user}`, the server answers with
//! a result code and the negotiated parameters (heartbeat interval, route
//! dictionary, per-route schema bundle). Everything here is parsed
//! defensively — a server omitting a section just means that feature is off.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Client implementation tag sent in the handshake.
pub const CLIENT_TYPE: &str = "rust-websocket";

/// Client implementation version sent in the handshake.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handshake accepted.
pub const CODE_OK: u16 = 200;
/// Handshake rejected by the server.
pub const CODE_FAIL: u16 = 500;
/// Client version no longer accepted.
pub const CODE_OLD_CLIENT: u16 = 501;

#[derive(Debug, Serialize)]
struct HandshakeSysRequest<'a> {
    #[serde(rename = "type")]
    client_type: &'a str,
    version: &'a str,
    #[serde(rename = "protoVersion")]
    proto_version: u64,
}

#[derive(Debug, Serialize)]
struct HandshakeRequest<'a> {
    sys: HandshakeSysRequest<'a>,
    user: &'a Value,
}

/// Build the JSON body of the client's HANDSHAKE packet.
pub fn request_body(user: &Value, proto_version: u64) -> Result<Vec<u8>> {
    let request = HandshakeRequest {
        sys: HandshakeSysRequest {
            client_type: CLIENT_TYPE,
            version: CLIENT_VERSION,
            proto_version,
        },
        user,
    };
    Ok(serde_json::to_vec(&request)?)
}

/// Per-route schema bundle negotiated at handshake. Opaque to the session —
/// only the configured [`SchemaCodec`](crate::codec::SchemaCodec) interprets
/// the schema values. Also the payload of the on-disk metadata cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProtoBundle {
    /// Version counter echoed back in later handshakes.
    #[serde(default)]
    pub version: u64,
    /// Schemas for client-encoded (outbound) routes.
    #[serde(default)]
    pub client: Value,
    /// Schemas for server-encoded (inbound) routes.
    #[serde(default)]
    pub server: Value,
}

/// The `sys` section of the server's handshake response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeSys {
    /// Keepalive interval in seconds; absent or 0 disables heartbeats.
    #[serde(default)]
    pub heartbeat: u64,
    /// Route-compression dictionary, route string -> code.
    #[serde(default)]
    pub dict: Option<HashMap<String, u16>>,
    /// Per-route schema bundle.
    #[serde(default)]
    pub protos: Option<ProtoBundle>,
}

/// Server handshake response.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeResponse {
    /// Result code: [`CODE_OK`], [`CODE_FAIL`] or [`CODE_OLD_CLIENT`].
    pub code: u16,
    /// Negotiated parameters; absent sections disable their features.
    #[serde(default)]
    pub sys: HandshakeSys,
    /// Application payload handed to the caller on success.
    #[serde(default)]
    pub user: Value,
}

/// Parse the server's HANDSHAKE packet body.
pub fn parse_response(body: &[u8]) -> Result<HandshakeResponse> {
    Ok(serde_json::from_slice(body)?)
}

/// Parse a KICK packet body. Malformed JSON degrades to the raw text rather
/// than aborting the session.
pub fn parse_kick_reason(body: &[u8]) -> Value {
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("kick payload is not JSON ({}), passing through raw", e);
            Value::String(String::from_utf8_lossy(body).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let user = json!({"token": "abc"});
        let body = request_body(&user, 3).unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(parsed["sys"]["type"], CLIENT_TYPE);
        assert_eq!(parsed["sys"]["version"], CLIENT_VERSION);
        assert_eq!(parsed["sys"]["protoVersion"], 3);
        assert_eq!(parsed["user"]["token"], "abc");
    }

    #[test]
    fn test_parse_full_response() {
        let body = json!({
            "code": 200,
            "sys": {
                "heartbeat": 5,
                "dict": {"foo.bar": 1},
                "protos": {"version": 7, "client": {"a.b": {}}, "server": {}}
            },
            "user": {"motd": "hi"}
        });
        let response = parse_response(body.to_string().as_bytes()).unwrap();

        assert_eq!(response.code, CODE_OK);
        assert_eq!(response.sys.heartbeat, 5);
        assert_eq!(response.sys.dict.as_ref().unwrap()["foo.bar"], 1);
        let protos = response.sys.protos.unwrap();
        assert_eq!(protos.version, 7);
        assert!(protos.client.get("a.b").is_some());
        assert_eq!(response.user["motd"], "hi");
    }

    #[test]
    fn test_parse_minimal_response() {
        let response = parse_response(br#"{"code": 200}"#).unwrap();
        assert_eq!(response.code, CODE_OK);
        assert_eq!(response.sys.heartbeat, 0);
        assert!(response.sys.dict.is_none());
        assert!(response.sys.protos.is_none());
        assert!(response.user.is_null());
    }

    #[test]
    fn test_parse_rejection_codes() {
        assert_eq!(parse_response(br#"{"code": 501}"#).unwrap().code, CODE_OLD_CLIENT);
        assert_eq!(parse_response(br#"{"code": 500}"#).unwrap().code, CODE_FAIL);
    }

    #[test]
    fn test_parse_malformed_response_is_error() {
        assert!(parse_response(b"not json").is_err());
    }

    #[test]
    fn test_kick_reason_json() {
        let reason = parse_kick_reason(br#"{"reason": "maintenance"}"#);
        assert_eq!(reason["reason"], "maintenance");
    }

    #[test]
    fn test_kick_reason_degrades_to_raw_text() {
        let reason = parse_kick_reason(b"bye now");
        assert_eq!(reason, Value::String("bye now".to_string()));
    }
}
