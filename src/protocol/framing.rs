//! Receive-Side Packet Framing
//!
//! TCP is a byte stream: one read can end in the middle of a header, in the
//! middle of a payload, or carry several packets at once. [`FrameDecoder`]
//! runs once per receive completion over the session's receive buffer and
//! turns whatever has accumulated into whole packets.
//!
//! ## State Machine
//!
//! ```text
//!            bytes left over                     all bytes consumed
//!   Idle ─────────────────────► Accumulating ─────────────────────► Idle
//!    ▲                              │  ▲
//!    └──────────────────────────────┘  └── still incomplete
//! ```
//!
//! ## One Pass
//!
//! 1. Fewer than 4 bytes available: stop.
//! 2. Decode the header. `size < 4` or `size > capacity` is a protocol
//!    violation. `size` greater than what is available: stop, wait for more.
//! 3. Hand `size` bytes to the callback, advance, repeat.
//! 4. Move any remainder to offset 0 so the next read lands right after it.

use crate::protocol::header::{Packet, PacketHeader, HEADER_SIZE};
use thiserror::Error;
use tracing::trace;

/// Protocol violations detected while framing. Both are fatal for the
/// connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Declared size is smaller than the header itself
    #[error("packet {packet_id} declares size {size}, smaller than the 4-byte header")]
    Undersized { size: u16, packet_id: u16 },

    /// Declared size can never fit in the receive buffer
    #[error("packet {packet_id} declares size {size}, larger than the receive buffer ({capacity} bytes)")]
    Oversized {
        size: u16,
        packet_id: u16,
        capacity: usize,
    },
}

/// Whether leftover bytes are waiting for the rest of their packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Accumulating,
}

/// Tracks leftover bytes across reads into one fixed receive buffer.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    capacity: usize,
    pending: usize,
}

impl FrameDecoder {
    /// Creates a decoder for a receive buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of leftover bytes at the front of the receive buffer; also the
    /// offset at which the next read must land.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn state(&self) -> FrameState {
        if self.pending == 0 {
            FrameState::Idle
        } else {
            FrameState::Accumulating
        }
    }

    /// Frames the bytes in `buf[..pending + received]`.
    ///
    /// `buf` is the receive buffer: its first [`pending`](Self::pending)
    /// bytes are the leftover from the previous pass and the next `received`
    /// bytes were just read. Each complete packet is passed to `on_packet`
    /// in arrival order. Returns the number of packets delivered.
    ///
    /// On a protocol violation the packets before the bad header have
    /// already been delivered, nothing from the bad header onward is, and
    /// the decoder is reset.
    pub fn decode<F>(
        &mut self,
        buf: &mut [u8],
        received: usize,
        mut on_packet: F,
    ) -> Result<usize, FrameError>
    where
        F: FnMut(Packet<'_>),
    {
        let mut available = self.pending + received;
        debug_assert!(available <= buf.len() && buf.len() <= self.capacity);

        let mut read = 0;
        let mut delivered = 0;

        while available >= HEADER_SIZE {
            let header = match PacketHeader::decode(&buf[read..]) {
                Some(header) => header,
                None => break,
            };
            let size = header.size as usize;

            if size < HEADER_SIZE {
                self.pending = 0;
                return Err(FrameError::Undersized {
                    size: header.size,
                    packet_id: header.packet_id,
                });
            }
            if size > self.capacity {
                self.pending = 0;
                return Err(FrameError::Oversized {
                    size: header.size,
                    packet_id: header.packet_id,
                    capacity: self.capacity,
                });
            }
            if size > available {
                break;
            }

            on_packet(Packet::new_unchecked(header, &buf[read..read + size]));
            delivered += 1;
            read += size;
            available -= size;
        }

        if available > 0 && read > 0 {
            buf.copy_within(read..read + available, 0);
        }
        self.pending = available;

        trace!(delivered, leftover = available, "Framing pass");
        Ok(delivered)
    }

    /// Drops any leftover bytes.
    pub fn reset(&mut self) {
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::encode_packet;

    /// Receive buffer plus decoder, fed the way a session feeds them.
    struct Harness {
        buf: Vec<u8>,
        decoder: FrameDecoder,
        packets: Vec<(u16, Vec<u8>)>,
    }

    impl Harness {
        fn new(capacity: usize) -> Self {
            Self {
                buf: vec![0u8; capacity],
                decoder: FrameDecoder::new(capacity),
                packets: Vec::new(),
            }
        }

        fn feed(&mut self, chunk: &[u8]) -> Result<usize, FrameError> {
            let offset = self.decoder.pending();
            self.buf[offset..offset + chunk.len()].copy_from_slice(chunk);
            let packets = &mut self.packets;
            self.decoder.decode(&mut self.buf, chunk.len(), |packet| {
                packets.push((packet.packet_id(), packet.payload().to_vec()));
            })
        }
    }

    #[test]
    fn test_single_packet() {
        let mut h = Harness::new(64);
        let bytes = encode_packet(1000, b"PINGPING").unwrap();
        assert_eq!(h.feed(&bytes), Ok(1));
        assert_eq!(h.packets, vec![(1000, b"PINGPING".to_vec())]);
        assert_eq!(h.decoder.state(), FrameState::Idle);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut h = Harness::new(64);
        let bytes = encode_packet(3, b"abcdef").unwrap();
        assert_eq!(bytes.len(), 10);

        for (i, byte) in bytes.iter().enumerate() {
            let delivered = h.feed(&[*byte]).unwrap();
            if i < 9 {
                assert_eq!(delivered, 0);
                assert_eq!(h.decoder.state(), FrameState::Accumulating);
                assert_eq!(h.decoder.pending(), i + 1);
            } else {
                assert_eq!(delivered, 1);
            }
        }
        assert_eq!(h.packets, vec![(3, b"abcdef".to_vec())]);
        assert_eq!(h.decoder.state(), FrameState::Idle);
    }

    #[test]
    fn test_three_packets_in_one_read() {
        let mut h = Harness::new(64);
        let mut stream = Vec::new();
        for id in [10u16, 11, 12] {
            stream.extend_from_slice(&encode_packet(id, &[id as u8, 0xFF]).unwrap());
        }
        assert_eq!(stream.len(), 18);

        assert_eq!(h.feed(&stream), Ok(3));
        let ids: Vec<u16> = h.packets.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn test_every_split_point() {
        let bytes = encode_packet(77, b"split me anywhere").unwrap();
        for split in 0..=bytes.len() {
            let mut h = Harness::new(64);
            h.feed(&bytes[..split]).unwrap();
            h.feed(&bytes[split..]).unwrap();
            assert_eq!(h.packets, vec![(77, b"split me anywhere".to_vec())], "split at {split}");
            assert_eq!(h.decoder.pending(), 0);
        }
    }

    #[test]
    fn test_every_three_way_split() {
        let bytes = encode_packet(9, b"0123456789").unwrap();
        for a in 0..=bytes.len() {
            for b in a..=bytes.len() {
                let mut h = Harness::new(32);
                h.feed(&bytes[..a]).unwrap();
                h.feed(&bytes[a..b]).unwrap();
                h.feed(&bytes[b..]).unwrap();
                assert_eq!(h.packets.len(), 1, "split at {a}/{b}");
                assert_eq!(h.packets[0].1, b"0123456789");
            }
        }
    }

    #[test]
    fn test_leftover_compacted_to_front() {
        let mut h = Harness::new(64);
        let first = encode_packet(1, b"xx").unwrap();
        let second = encode_packet(2, b"yyyy").unwrap();
        let mut stream = first.to_vec();
        stream.extend_from_slice(&second[..5]);

        assert_eq!(h.feed(&stream), Ok(1));
        assert_eq!(h.decoder.pending(), 5);
        assert_eq!(&h.buf[..5], &second[..5]);

        assert_eq!(h.feed(&second[5..]), Ok(1));
        assert_eq!(h.packets[1], (2, b"yyyy".to_vec()));
    }

    #[test]
    fn test_undersized_header_is_violation() {
        for size in 0u16..4 {
            for tail in [&b""[..], &b"\x08\x00\x01\x00AAAA"[..]] {
                let mut h = Harness::new(64);
                let mut stream = size.to_le_bytes().to_vec();
                stream.extend_from_slice(&5u16.to_le_bytes());
                stream.extend_from_slice(tail);

                let err = h.feed(&stream).unwrap_err();
                assert_eq!(err, FrameError::Undersized { size, packet_id: 5 });
                assert!(h.packets.is_empty());
                assert_eq!(h.decoder.pending(), 0);
            }
        }
    }

    #[test]
    fn test_oversized_header_is_violation() {
        let mut h = Harness::new(32);
        let err = h.feed(&[33, 0, 1, 0]).unwrap_err();
        assert_eq!(
            err,
            FrameError::Oversized {
                size: 33,
                packet_id: 1,
                capacity: 32
            }
        );

        let mut h = Harness::new(32);
        assert_eq!(h.feed(&[32, 0, 1, 0]), Ok(0));
    }

    #[test]
    fn test_packets_before_violation_are_delivered() {
        let mut h = Harness::new(64);
        let mut stream = encode_packet(1, b"ok").unwrap().to_vec();
        stream.extend_from_slice(&[1, 0, 2, 0]);

        assert!(h.feed(&stream).is_err());
        assert_eq!(h.packets, vec![(1, b"ok".to_vec())]);
    }

    #[test]
    fn test_full_capacity_packet() {
        let mut h = Harness::new(16);
        let bytes = encode_packet(4, &[0x5A; 12]).unwrap();
        assert_eq!(h.feed(&bytes[..7]), Ok(0));
        assert_eq!(h.feed(&bytes[7..]), Ok(1));
        assert_eq!(h.packets[0].1, vec![0x5A; 12]);
    }
}
