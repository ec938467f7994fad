//! Transport boundary: a duplex socket delivering whole binary frames.
//!
//! The session driver only ever talks to these traits, which keeps the
//! protocol machinery independent of the concrete socket. Production code
//! uses [`WsConnector`]; tests plug in channel-backed implementations.

mod ws;

pub use ws::WsConnector;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opens a connection and hands back its two halves.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a duplex socket against `url`.
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}

/// Outbound half: sends whole binary frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame.
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Close the connection. Best effort; errors are swallowed.
    async fn close(&mut self);
}

/// Inbound half: yields whole binary frames until the connection ends.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame; `None` once the connection is closed.
    async fn next(&mut self) -> Option<Result<Bytes>>;
}
