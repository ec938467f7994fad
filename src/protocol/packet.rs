//! Outer packet framing.
//!
//! Implements the 4-byte packet header:
//! ```text
//! ┌────────┬──────────────┐
//! │ Type   │ Body length  │
//! │ 1 byte │ 3 bytes BE   │
//! └────────┴──────────────┘
//! ```
//! followed by the raw body. HEARTBEAT and HANDSHAKE_ACK packets carry no
//! body. Several packets may be concatenated inside a single transport frame;
//! [`decode_packets`] extracts all of them.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PylonError, Result};

/// Packet header size in bytes (fixed, exactly 4).
pub const PACKET_HEADER_SIZE: usize = 4;

/// Maximum body length representable in the 24-bit length field.
pub const MAX_PACKET_BODY: usize = 0x00FF_FFFF;

/// Packet type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Client -> server handshake request, JSON body.
    Handshake = 1,
    /// Client -> server handshake acknowledgement, empty body.
    HandshakeAck = 2,
    /// Keepalive probe in either direction, empty body.
    Heartbeat = 3,
    /// Application message, body is an encoded wire message.
    Data = 4,
    /// Server -> client eviction notice, JSON reason body.
    Kick = 5,
}

impl PacketType {
    /// Decode a type tag, rejecting unknown values.
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Self::Handshake),
            2 => Ok(Self::HandshakeAck),
            3 => Ok(Self::Heartbeat),
            4 => Ok(Self::Data),
            5 => Ok(Self::Kick),
            other => Err(PylonError::Protocol(format!(
                "unknown packet type tag: {}",
                other
            ))),
        }
    }
}

/// A complete protocol packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet type tag.
    pub ptype: PacketType,
    /// Body bytes (zero-copy via `bytes::Bytes`, empty for header-only types).
    pub body: Bytes,
}

impl Packet {
    /// Create a packet from parts.
    pub fn new(ptype: PacketType, body: Bytes) -> Self {
        Self { ptype, body }
    }

    /// Handshake request packet carrying a JSON body.
    pub fn handshake(body: Bytes) -> Self {
        Self::new(PacketType::Handshake, body)
    }

    /// Handshake acknowledgement packet (no body).
    pub fn handshake_ack() -> Self {
        Self::new(PacketType::HandshakeAck, Bytes::new())
    }

    /// Heartbeat packet (no body).
    pub fn heartbeat() -> Self {
        Self::new(PacketType::Heartbeat, Bytes::new())
    }

    /// Data packet wrapping an encoded wire message.
    pub fn data(body: Bytes) -> Self {
        Self::new(PacketType::Data, body)
    }

    /// Encode this packet as header + body.
    ///
    /// # Errors
    ///
    /// Returns `PylonError::Protocol` if the body exceeds the 24-bit length
    /// field.
    pub fn encode(&self) -> Result<Bytes> {
        if self.body.len() > MAX_PACKET_BODY {
            return Err(PylonError::Protocol(format!(
                "packet body {} exceeds maximum {}",
                self.body.len(),
                MAX_PACKET_BODY
            )));
        }

        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + self.body.len());
        buf.put_u8(self.ptype as u8);
        let len = self.body.len() as u32;
        buf.put_u8((len >> 16) as u8);
        buf.put_u8((len >> 8) as u8);
        buf.put_u8(len as u8);
        buf.extend_from_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

/// Decode all packets contained in a transport frame.
///
/// The transport preserves message boundaries, so a frame holds one or more
/// whole packets. A truncated header, a body length overrunning the frame, or
/// an unknown type tag is a protocol error rather than a silent drop.
pub fn decode_packets(frame: &[u8]) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    let mut rest = frame;

    while !rest.is_empty() {
        if rest.len() < PACKET_HEADER_SIZE {
            return Err(PylonError::Protocol(format!(
                "truncated packet header: {} bytes remaining",
                rest.len()
            )));
        }

        let ptype = PacketType::from_u8(rest[0])?;
        let len = ((rest[1] as usize) << 16) | ((rest[2] as usize) << 8) | rest[3] as usize;
        rest = &rest[PACKET_HEADER_SIZE..];

        if rest.len() < len {
            return Err(PylonError::Protocol(format!(
                "packet body length {} overruns frame ({} bytes remaining)",
                len,
                rest.len()
            )));
        }

        packets.push(Packet::new(ptype, Bytes::copy_from_slice(&rest[..len])));
        rest = &rest[len..];
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let packet = Packet::data(Bytes::from_static(b"hello"));
        let encoded = packet.encode().unwrap();

        let decoded = decode_packets(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].ptype, PacketType::Data);
        assert_eq!(&decoded[0].body[..], b"hello");
    }

    #[test]
    fn test_header_layout_big_endian() {
        let body = Bytes::from(vec![0u8; 0x010203]);
        let packet = Packet::data(body);
        let encoded = packet.encode().unwrap();

        assert_eq!(encoded[0], PacketType::Data as u8);
        assert_eq!(encoded[1], 0x01);
        assert_eq!(encoded[2], 0x02);
        assert_eq!(encoded[3], 0x03);
        assert_eq!(encoded.len(), PACKET_HEADER_SIZE + 0x010203);
    }

    #[test]
    fn test_header_only_packets_have_empty_body() {
        for packet in [Packet::heartbeat(), Packet::handshake_ack()] {
            let encoded = packet.encode().unwrap();
            assert_eq!(encoded.len(), PACKET_HEADER_SIZE);
            assert_eq!(&encoded[1..4], &[0, 0, 0]);
        }
    }

    #[test]
    fn test_unknown_type_tag_rejected() {
        let frame = [9u8, 0, 0, 0];
        let err = decode_packets(&frame).unwrap_err();
        assert!(err.to_string().contains("unknown packet type"));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let frame = [4u8, 0, 0];
        assert!(decode_packets(&frame).is_err());
    }

    #[test]
    fn test_body_overrun_rejected() {
        // Claims 5 body bytes, provides 2.
        let frame = [4u8, 0, 0, 5, b'a', b'b'];
        let err = decode_packets(&frame).unwrap_err();
        assert!(err.to_string().contains("overruns"));
    }

    #[test]
    fn test_concatenated_packets() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&Packet::heartbeat().encode().unwrap());
        frame.extend_from_slice(&Packet::data(Bytes::from_static(b"xy")).encode().unwrap());
        frame.extend_from_slice(
            &Packet::new(PacketType::Kick, Bytes::from_static(b"{}"))
                .encode()
                .unwrap(),
        );

        let packets = decode_packets(&frame).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].ptype, PacketType::Heartbeat);
        assert_eq!(packets[1].ptype, PacketType::Data);
        assert_eq!(&packets[1].body[..], b"xy");
        assert_eq!(packets[2].ptype, PacketType::Kick);
    }

    #[test]
    fn test_empty_frame_yields_no_packets() {
        assert!(decode_packets(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_body_rejected_on_encode() {
        let packet = Packet::data(Bytes::from(vec![0u8; MAX_PACKET_BODY + 1]));
        assert!(packet.encode().is_err());
    }
}
