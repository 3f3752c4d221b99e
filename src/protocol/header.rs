//! Packet Header and Wire Format
//!
//! Every packet on the wire starts with a 4-byte header:
//!
//! ```text
//!  0        2        4                       size
//!  ├────────┼────────┼───────────────────────┤
//!  │ size   │ id     │ payload ...           │
//!  │ u16 LE │ u16 LE │ (size - 4 bytes)      │
//!  └────────┴────────┴───────────────────────┘
//! ```
//!
//! `size` counts the header itself. Packets are concatenated back to back
//! with no other delimiter.

use crate::buffer::BufferReader;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the packet header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload a header can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// Errors from building packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The payload does not fit in a 16-bit size field
    #[error("payload too large: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },
}

/// The fixed header at the front of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    /// Total packet size, header included
    pub size: u16,
    /// Packet type, used to route the packet to a handler
    pub packet_id: u16,
}

impl PacketHeader {
    /// Builds the header for a packet carrying `payload_len` bytes.
    pub fn for_payload(packet_id: u16, payload_len: usize) -> Result<Self, PacketError> {
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            size: (HEADER_SIZE + payload_len) as u16,
            packet_id,
        })
    }

    /// Decodes a header from the first four bytes of `bytes`.
    ///
    /// Returns `None` if fewer than [`HEADER_SIZE`] bytes are available.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..HEADER_SIZE)?;
        Some(Self {
            size: u16::from_le_bytes([raw[0], raw[1]]),
            packet_id: u16::from_le_bytes([raw[2], raw[3]]),
        })
    }

    /// Encodes the header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let size = self.size.to_le_bytes();
        let id = self.packet_id.to_le_bytes();
        [size[0], size[1], id[0], id[1]]
    }

    /// Payload length implied by `size`.
    pub fn payload_len(&self) -> usize {
        (self.size as usize).saturating_sub(HEADER_SIZE)
    }
}

/// A complete, framed packet borrowed from a receive buffer.
///
/// Valid only for the duration of the dispatch call that receives it;
/// copy out anything that must outlive the handler.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    header: PacketHeader,
    bytes: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Wraps `bytes` as a packet if it holds exactly one well-formed packet.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        let header = PacketHeader::decode(bytes)?;
        if (header.size as usize) < HEADER_SIZE || header.size as usize != bytes.len() {
            return None;
        }
        Some(Self { header, bytes })
    }

    pub(crate) fn new_unchecked(header: PacketHeader, bytes: &'a [u8]) -> Self {
        debug_assert_eq!(header.size as usize, bytes.len());
        Self { header, bytes }
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn packet_id(&self) -> u16 {
        self.header.packet_id
    }

    /// Header and payload.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// A read cursor over the payload.
    pub fn reader(&self) -> BufferReader<'a> {
        BufferReader::new(self.payload())
    }
}

/// Serializes a packet into a standalone byte buffer.
pub fn encode_packet(packet_id: u16, payload: &[u8]) -> Result<Bytes, PacketError> {
    let header = PacketHeader::for_payload(packet_id, payload.len())?;
    let mut out = BytesMut::with_capacity(header.size as usize);
    out.put_u16_le(header.size);
    out.put_u16_le(header.packet_id);
    out.put_slice(payload);
    Ok(out.freeze())
}
