//! Error types for pylon-client.

use thiserror::Error;

/// Main error type for all pylon operations.
#[derive(Debug, Error)]
pub enum PylonError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport error.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error (handshake, kick, plain bodies).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error (schema-coded bodies).
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (unknown packet type, truncated frame, oversized route).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Handshake rejected by the server. Not retried automatically.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Server reported the client version as too old. Not retried automatically.
    #[error("client version not accepted by server")]
    OutdatedClient,

    /// Connection closed (or session driver gone) while an operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using PylonError.
pub type Result<T> = std::result::Result<T, PylonError>;
