//! Inner message wire format (the body of DATA packets).
//!
//! Layout:
//! ```text
//! ┌──────────┬──────────────┬──────────────────┬──────────┐
//! │ Flag     │ Message id   │ Route            │ Body     │
//! │ 1 byte   │ LEB128 varint│ code or string   │ raw      │
//! └──────────┴──────────────┴──────────────────┴──────────┘
//! ```
//!
//! `flag = (kind << 1) | compressed`. The id is present only for REQUEST and
//! RESPONSE messages. A compressed route is a `u16` BE dictionary code; an
//! uncompressed route is a length-prefixed UTF-8 string. RESPONSE messages
//! carry no route at all — the receiver recovers it from its correlation
//! table.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PylonError, Result};

/// Bit 0 of the flag byte: route is a dictionary code.
const FLAG_COMPRESSED_ROUTE: u8 = 0x01;

/// Message kind, two client-originated and two server-originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Client -> server, correlated by id.
    Request = 0,
    /// Client -> server, fire-and-forget (id 0, not carried on the wire).
    Notify = 1,
    /// Server -> client, correlated by id, no route on the wire.
    Response = 2,
    /// Server -> client, unsolicited, routed.
    Push = 3,
}

impl MessageKind {
    fn from_u8(kind: u8) -> Result<Self> {
        match kind {
            0 => Ok(Self::Request),
            1 => Ok(Self::Notify),
            2 => Ok(Self::Response),
            3 => Ok(Self::Push),
            other => Err(PylonError::Protocol(format!(
                "unknown message kind: {}",
                other
            ))),
        }
    }

    /// Whether this kind carries a message id on the wire.
    #[inline]
    fn has_id(self) -> bool {
        matches!(self, Self::Request | Self::Response)
    }

    /// Whether this kind carries a route on the wire.
    #[inline]
    fn has_route(self) -> bool {
        !matches!(self, Self::Response)
    }
}

/// Route as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRef {
    /// Dictionary-compressed route code.
    Code(u16),
    /// Verbatim route string.
    Name(String),
}

/// A decoded wire message. The body is left raw; body decoding needs the
/// negotiated codec selection, which lives a layer up.
#[derive(Debug, Clone)]
pub struct WireMessage {
    /// Message kind.
    pub kind: MessageKind,
    /// Correlation id; 0 for NOTIFY and PUSH.
    pub id: u32,
    /// Route, absent for RESPONSE.
    pub route: Option<RouteRef>,
    /// Raw body bytes.
    pub body: Bytes,
}

/// Encode a message.
///
/// REQUEST and RESPONSE carry `id`; NOTIFY and PUSH must use id 0. The route
/// is required for every kind except RESPONSE.
///
/// # Errors
///
/// Returns `PylonError::Protocol` for a missing route or a route name longer
/// than 255 bytes.
pub fn encode_message(
    kind: MessageKind,
    id: u32,
    route: Option<&RouteRef>,
    body: &[u8],
) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(1 + 5 + 256 + body.len());

    let compressed = matches!(route, Some(RouteRef::Code(_)));
    let flag = ((kind as u8) << 1) | u8::from(compressed);
    buf.put_u8(flag);

    if kind.has_id() {
        encode_varint(id, &mut buf);
    }

    if kind.has_route() {
        match route {
            Some(RouteRef::Code(code)) => buf.put_u16(*code),
            Some(RouteRef::Name(name)) => {
                let raw = name.as_bytes();
                if raw.len() > u8::MAX as usize {
                    return Err(PylonError::Protocol(format!(
                        "route name too long: {} bytes",
                        raw.len()
                    )));
                }
                buf.put_u8(raw.len() as u8);
                buf.extend_from_slice(raw);
            }
            None => {
                return Err(PylonError::Protocol(format!(
                    "message kind {:?} requires a route",
                    kind
                )))
            }
        }
    }

    buf.extend_from_slice(body);
    Ok(buf.freeze())
}

/// Decode a message from a DATA packet body.
pub fn decode_message(raw: &[u8]) -> Result<WireMessage> {
    if raw.is_empty() {
        return Err(PylonError::Protocol("empty message".to_string()));
    }

    let flag = raw[0];
    let compressed = flag & FLAG_COMPRESSED_ROUTE != 0;
    let kind = MessageKind::from_u8(flag >> 1)?;
    let mut offset = 1;

    let id = if kind.has_id() {
        let (id, read) = decode_varint(&raw[offset..])?;
        offset += read;
        id
    } else {
        0
    };

    let route = if kind.has_route() {
        if compressed {
            if raw.len() < offset + 2 {
                return Err(PylonError::Protocol("truncated route code".to_string()));
            }
            let code = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
            offset += 2;
            Some(RouteRef::Code(code))
        } else {
            if raw.len() < offset + 1 {
                return Err(PylonError::Protocol("truncated route length".to_string()));
            }
            let len = raw[offset] as usize;
            offset += 1;
            if raw.len() < offset + len {
                return Err(PylonError::Protocol("truncated route name".to_string()));
            }
            let name = std::str::from_utf8(&raw[offset..offset + len])
                .map_err(|e| PylonError::Protocol(format!("route is not UTF-8: {}", e)))?
                .to_string();
            offset += len;
            Some(RouteRef::Name(name))
        }
    } else {
        None
    };

    Ok(WireMessage {
        kind,
        id,
        route,
        body: Bytes::copy_from_slice(&raw[offset..]),
    })
}

/// Write a message id as a little-endian base-128 varint.
fn encode_varint(mut value: u32, buf: &mut BytesMut) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            return;
        }
    }
}

/// Read a little-endian base-128 varint, returning (value, bytes consumed).
fn decode_varint(raw: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in raw.iter().enumerate() {
        if i >= 5 || (i == 4 && byte & 0xF0 != 0) {
            return Err(PylonError::Protocol(
                "message id exceeds 32 bits".to_string(),
            ));
        }
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(PylonError::Protocol("truncated message id".to_string()))
}
