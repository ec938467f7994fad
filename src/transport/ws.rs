//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::Result;

use super::{Connector, FrameSink, FrameSource};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector: `ws://` and `wss://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let (ws, _response) = connect_async(url).await?;
        let (tx, rx) = ws.split();
        Ok((Box::new(WsSink { tx }), Box::new(WsSource { rx })))
    }
}

struct WsSink {
    tx: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Bytes) -> Result<()> {
        self.tx.send(Message::Binary(frame.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.tx.send(Message::Close(None)).await;
        let _ = self.tx.close().await;
    }
}

struct WsSource {
    rx: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<Result<Bytes>> {
        while let Some(item) = self.rx.next().await {
            match item {
                Ok(Message::Binary(data)) => return Some(Ok(Bytes::from(data))),
                Ok(Message::Close(_)) => return None,
                // tungstenite answers pings internally; nothing to do here.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Text(text)) => {
                    tracing::debug!("ignoring text frame ({} bytes)", text.len());
                    continue;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }
}
