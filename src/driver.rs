//! Connection state machine: the per-session driver task.
//!
//! One driver per session owns every piece of mutable protocol state — the
//! transport halves, the negotiated message codec, the correlation table, the
//! heartbeat timers and the request-id counter — and serializes all of it
//! through a single `select!` loop over three inputs: caller commands, socket
//! frames and the heartbeat clock. Nothing here is shared across sessions.
//!
//! Lifecycle: connect -> handshake -> ready -> closed, then either done (user
//! close, handshake rejection, reconnect disabled) or a fixed 1-second pause
//! and a fresh connect. Every transport failure funnels through the same
//! close path, so heartbeat timers are torn down exactly once per connection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::{MessageCodec, ProtoCache, SchemaCodec};
use crate::dict::RouteDict;
use crate::error::{PylonError, Result};
use crate::events::{EventHub, SessionEvent};
use crate::handshake;
use crate::heartbeat::{Beat, Heartbeat};
use crate::pending::PendingTable;
use crate::protocol::{decode_message, decode_packets, MessageKind, Packet, PacketType, RouteRef};
use crate::session::{Command, RequestMonitor};
use crate::transport::{Connector, FrameSink, FrameSource};

/// Fixed pause between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Why the connected loop ended.
enum Closed {
    /// The caller closed the session (or dropped the handle).
    User,
    /// The transport died or liveness lapsed.
    Transport,
}

/// Immutable driver configuration, captured from the builder.
pub(crate) struct DriverConfig {
    pub url: String,
    pub user: Value,
    pub auto_reconnect: bool,
    pub connector: Arc<dyn Connector>,
    pub schema_codec: Option<Arc<dyn SchemaCodec>>,
    pub proto_cache: Option<PathBuf>,
    pub monitor: Option<Arc<dyn RequestMonitor>>,
}

/// The session driver. Constructed by the session builder, consumed by
/// [`Driver::run`] on its own task.
pub(crate) struct Driver {
    cfg: DriverConfig,
    hub: Arc<EventHub>,
    cmd_rx: mpsc::Receiver<Command>,
    /// Negotiated message codec, rebuilt on every handshake.
    codec: MessageCodec,
    /// Outstanding requests; survives reconnects untouched.
    pending: PendingTable,
    /// Liveness timers; exists only while a connection does.
    heartbeat: Option<Heartbeat>,
    /// Monotonic request-id counter, never reset for the session's lifetime.
    next_req_id: u32,
    /// Schema metadata version echoed into handshake requests.
    proto_version: u64,
    /// Server `user` payload from the latest handshake.
    handshake_user: Value,
}

impl Driver {
    pub(crate) fn new(
        cfg: DriverConfig,
        hub: Arc<EventHub>,
        cmd_rx: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            cfg,
            hub,
            cmd_rx,
            codec: MessageCodec::plain(),
            pending: PendingTable::new(),
            heartbeat: None,
            next_req_id: 0,
            proto_version: 0,
            handshake_user: Value::Null,
        }
    }

    /// Drive the session to completion. `init_tx` resolves the caller's
    /// `connect()` exactly once — with the handshake's user payload or with
    /// the first failure.
    pub(crate) async fn run(mut self, init_tx: oneshot::Sender<Result<Value>>) {
        if let Some(path) = &self.cfg.proto_cache {
            if let Some(bundle) = ProtoCache::load(path) {
                info!(version = bundle.version, "loaded cached schema metadata");
                self.proto_version = bundle.version;
                if let Some(codec) = &self.cfg.schema_codec {
                    codec.configure(&bundle);
                }
            }
        }

        let mut init_tx = Some(init_tx);
        let mut attempt: u32 = 0;

        loop {
            match self.connect_and_handshake().await {
                Ok((mut sink, mut source)) => {
                    match init_tx.take() {
                        Some(tx) => {
                            let _ = tx.send(Ok(self.handshake_user.clone()));
                        }
                        None => {
                            attempt = 0;
                            self.hub.emit(SessionEvent::Reconnected);
                        }
                    }

                    let closed = self.run_ready(&mut sink, &mut source).await;
                    self.heartbeat = None;
                    self.hub.emit(SessionEvent::Close);

                    if matches!(closed, Closed::User) || !self.cfg.auto_reconnect {
                        return;
                    }
                }
                Err(e) => {
                    if let Some(tx) = init_tx.take() {
                        // First connect: the failure belongs to the caller.
                        let _ = tx.send(Err(e));
                        return;
                    }
                    if matches!(
                        e,
                        PylonError::OutdatedClient | PylonError::HandshakeFailed(_)
                    ) {
                        // Rejected handshakes are never retried.
                        return;
                    }
                    self.hub.emit(SessionEvent::IoError(e.to_string()));
                    if !self.cfg.auto_reconnect {
                        return;
                    }
                }
            }

            if !self.wait_before_reconnect(&mut attempt).await {
                return;
            }
        }
    }

    /// Open the transport and complete the handshake exchange.
    async fn connect_and_handshake(
        &mut self,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        info!(url = %self.cfg.url, "connecting");
        let (mut sink, mut source) = self.cfg.connector.connect(&self.cfg.url).await?;

        let body = handshake::request_body(&self.cfg.user, self.proto_version)?;
        sink.send(Packet::handshake(Bytes::from(body)).encode()?)
            .await?;

        loop {
            let frame = match source.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e),
                None => return Err(PylonError::ConnectionClosed),
            };

            for packet in decode_packets(&frame)? {
                match packet.ptype {
                    PacketType::Handshake => {
                        self.apply_handshake(&packet.body)?;
                        sink.send(Packet::handshake_ack().encode()?).await?;
                        return Ok((sink, source));
                    }
                    other => {
                        debug!(ptype = ?other, "ignoring packet during handshake");
                    }
                }
            }
        }
    }

    /// Adopt the server's handshake response, rebuilding all negotiated
    /// state from scratch.
    fn apply_handshake(&mut self, body: &[u8]) -> Result<()> {
        let response = handshake::parse_response(body)?;
        match response.code {
            handshake::CODE_OK => {}
            handshake::CODE_OLD_CLIENT => {
                self.hub.emit(SessionEvent::Error(
                    "client version not accepted by server".to_string(),
                ));
                return Err(PylonError::OutdatedClient);
            }
            code => {
                self.hub
                    .emit(SessionEvent::Error(format!("handshake rejected: {}", code)));
                return Err(PylonError::HandshakeFailed(format!("code {}", code)));
            }
        }

        let dict = match &response.sys.dict {
            Some(map) => RouteDict::from_handshake(map),
            None => RouteDict::empty(),
        };

        if let Some(protos) = &response.sys.protos {
            self.proto_version = protos.version;
            if let Some(codec) = &self.cfg.schema_codec {
                codec.configure(protos);
            }
            if let Some(path) = &self.cfg.proto_cache {
                if let Err(e) = ProtoCache::store(path, protos) {
                    warn!("failed to persist schema metadata: {}", e);
                }
            }
        }

        info!(
            heartbeat_secs = response.sys.heartbeat,
            dict_routes = dict.len(),
            proto_version = self.proto_version,
            "handshake complete"
        );

        self.codec = MessageCodec::new(dict, self.cfg.schema_codec.clone());
        self.heartbeat = Heartbeat::new(
            Duration::from_secs(response.sys.heartbeat),
            Instant::now(),
        );
        self.handshake_user = response.user;
        Ok(())
    }

    /// Steady state: interleave caller commands, socket frames and the
    /// heartbeat clock until the connection ends.
    async fn run_ready(
        &mut self,
        sink: &mut Box<dyn FrameSink>,
        source: &mut Box<dyn FrameSource>,
    ) -> Closed {
        let heartbeat_frame = Packet::heartbeat()
            .encode()
            .expect("heartbeat packet has no body");

        loop {
            let wakeup = self.heartbeat.as_ref().map(Heartbeat::next_wakeup);
            let Driver {
                cmd_rx,
                pending,
                codec,
                heartbeat,
                hub,
                next_req_id,
                cfg,
                ..
            } = self;

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => {
                        debug!("session closed by caller");
                        sink.close().await;
                        return Closed::User;
                    }
                    Some(Command::Request { route, body, reply }) => {
                        *next_req_id += 1;
                        let id = *next_req_id;
                        match codec.encode(id, &route, &body).and_then(|m| Packet::data(m).encode()) {
                            Ok(frame) => {
                                if let Err(e) = sink.send(frame).await {
                                    hub.emit(SessionEvent::IoError(e.to_string()));
                                    let _ = reply.send(Err(PylonError::ConnectionClosed));
                                    return Closed::Transport;
                                }
                                if let Some(monitor) = &cfg.monitor {
                                    monitor.on_start(&route, id);
                                }
                                pending.track(id, route, reply);
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                    Some(Command::Notify { route, body, reply }) => {
                        match codec.encode(0, &route, &body).and_then(|m| Packet::data(m).encode()) {
                            Ok(frame) => {
                                if let Err(e) = sink.send(frame).await {
                                    hub.emit(SessionEvent::IoError(e.to_string()));
                                    let _ = reply.send(Err(PylonError::ConnectionClosed));
                                    return Closed::Transport;
                                }
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e));
                            }
                        }
                    }
                },

                frame = source.next() => match frame {
                    None => {
                        debug!("transport closed by peer");
                        return Closed::Transport;
                    }
                    Some(Err(e)) => {
                        hub.emit(SessionEvent::IoError(e.to_string()));
                        return Closed::Transport;
                    }
                    Some(Ok(frame)) => {
                        if let Some(hb) = heartbeat.as_mut() {
                            hb.on_inbound(Instant::now());
                        }
                        match decode_packets(&frame) {
                            Ok(packets) => {
                                for packet in packets {
                                    match packet.ptype {
                                        // Deadline already refreshed above; the reply
                                        // cadence is the local timer's business.
                                        PacketType::Heartbeat => {}
                                        PacketType::Data => dispatch_data(
                                            &packet.body,
                                            pending,
                                            codec,
                                            hub,
                                            cfg.monitor.as_deref(),
                                        ),
                                        PacketType::Kick => {
                                            let reason = handshake::parse_kick_reason(&packet.body);
                                            info!(reason = %reason, "kicked by server");
                                            hub.emit(SessionEvent::Kick(reason));
                                        }
                                        PacketType::Handshake | PacketType::HandshakeAck => {
                                            debug!(ptype = ?packet.ptype, "ignoring handshake packet while ready");
                                        }
                                    }
                                }
                            }
                            Err(e) => warn!("dropping undecodable frame: {}", e),
                        }
                    }
                },

                () = heartbeat_sleep(wakeup) => {
                    let now = Instant::now();
                    if let Some(hb) = heartbeat.as_mut() {
                        while let Some(beat) = hb.poll(now) {
                            match beat {
                                Beat::Send => {
                                    debug!("sending heartbeat");
                                    if let Err(e) = sink.send(heartbeat_frame.clone()).await {
                                        hub.emit(SessionEvent::IoError(e.to_string()));
                                        return Closed::Transport;
                                    }
                                }
                                Beat::TimedOut => {
                                    warn!("heartbeat timeout, forcing disconnect");
                                    hub.emit(SessionEvent::HeartbeatTimeout);
                                    sink.close().await;
                                    return Closed::Transport;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Fixed-backoff pause before the next reconnect attempt. Returns false
    /// when the caller closed the session while waiting. Commands other than
    /// close fail fast — there is no connection to serve them.
    async fn wait_before_reconnect(&mut self, attempt: &mut u32) -> bool {
        let delay = tokio::time::sleep(RECONNECT_DELAY);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = &mut delay => {
                    self.hub.emit(SessionEvent::Reconnect { attempt: *attempt });
                    *attempt += 1;
                    return true;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Close) => return false,
                    Some(Command::Request { reply, .. }) => {
                        let _ = reply.send(Err(PylonError::ConnectionClosed));
                    }
                    Some(Command::Notify { reply, .. }) => {
                        let _ = reply.send(Err(PylonError::ConnectionClosed));
                    }
                },
            }
        }
    }
}

/// Sleep until the heartbeat's next timer, or forever when heartbeats are
/// disabled.
async fn heartbeat_sleep(wakeup: Option<Instant>) {
    match wakeup {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Decode and dispatch one DATA packet body.
fn dispatch_data(
    body: &[u8],
    pending: &mut PendingTable,
    codec: &MessageCodec,
    hub: &EventHub,
    monitor: Option<&dyn RequestMonitor>,
) {
    let msg = match decode_message(body) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("dropping undecodable message: {}", e);
            return;
        }
    };

    match msg.kind {
        MessageKind::Response => {
            // Destructive lookup: a stray or duplicate id resolves nothing,
            // preserving exactly-once delivery per request.
            let Some(entry) = pending.resolve(msg.id) else {
                debug!(id = msg.id, "response with no tracked request, dropping");
                return;
            };
            match codec.decode_body(&entry.route, &msg.body) {
                Ok(value) => {
                    if let Some(monitor) = monitor {
                        monitor.on_end(&entry.route, msg.id);
                    }
                    let _ = entry.reply.send(Ok(value));
                }
                Err(e) => {
                    warn!(route = %entry.route, id = msg.id, "response body undecodable: {}", e);
                    let _ = entry.reply.send(Err(e));
                }
            }
        }
        MessageKind::Push => {
            let Some(route_ref) = msg.route else {
                warn!("push without route, dropping");
                return;
            };
            match codec.expand_route(&route_ref) {
                Some(route) => match codec.decode_body(&route, &msg.body) {
                    Ok(value) => hub.emit_push(route, value),
                    Err(e) => warn!(route = %route, "push body undecodable: {}", e),
                },
                None => {
                    // Unknown dictionary code: deliver an empty body rather
                    // than failing the session.
                    if let RouteRef::Code(code) = route_ref {
                        warn!(code, "push route code has no reverse mapping");
                        hub.emit_push(code.to_string(), Value::Object(Default::default()));
                    }
                }
            }
        }
        MessageKind::Request | MessageKind::Notify => {
            warn!(kind = ?msg.kind, "unexpected client-bound message kind, dropping");
        }
    }
}
