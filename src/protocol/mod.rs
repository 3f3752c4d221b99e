//! Packet Protocol Implementation
//!
//! The wire protocol is a plain length-prefixed stream: a 4-byte
//! little-endian header (`size`, `packet_id`) followed by `size - 4` payload
//! bytes. There is no other delimiter and no schema beyond the header.
//!
//! ## Modules
//!
//! - `header`: `PacketHeader`, the borrowed `Packet` view, packet encoding
//! - `framing`: `FrameDecoder`, the receive-side reassembly state machine
//!
//! ## Example
//!
//! ```
//! use netsession::protocol::{encode_packet, FrameDecoder};
//!
//! let wire = encode_packet(1000, b"PINGPING").unwrap();
//!
//! let mut recv = vec![0u8; 64];
//! let mut decoder = FrameDecoder::new(recv.len());
//!
//! // first read delivers half the packet
//! recv[..6].copy_from_slice(&wire[..6]);
//! assert_eq!(decoder.decode(&mut recv, 6, |_| unreachable!()).unwrap(), 0);
//!
//! // second read lands after the leftover bytes
//! let at = decoder.pending();
//! recv[at..at + 6].copy_from_slice(&wire[6..]);
//! decoder
//!     .decode(&mut recv, 6, |packet| assert_eq!(packet.payload(), b"PINGPING"))
//!     .unwrap();
//! ```

pub mod framing;
pub mod header;

pub use framing::{FrameDecoder, FrameError, FrameState};
pub use header::{encode_packet, Packet, PacketError, PacketHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
