//! Wire protocol: outer packet framing and the inner message format.

mod message;
mod packet;

pub use message::{decode_message, encode_message, MessageKind, RouteRef, WireMessage};
pub use packet::{decode_packets, Packet, PacketType, MAX_PACKET_BODY, PACKET_HEADER_SIZE};
