//! Wire-format definitions for SHAM segments.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw datagram back into a [`Packet`], rejecting input
//!   that cannot hold a header.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Flags             |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 12 bytes.
//! There is no length field: the datagram boundary delimits the payload.

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Synchronise sequence numbers (handshake).
    pub const SYN: u16 = 0x1;
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 0x2;
    /// Finish: the sender has no more data to send.
    pub const FIN: u16 = 0x4;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 12;

/// Largest payload a single packet may carry.
pub const MAX_PAYLOAD: usize = 1024;

/// Largest datagram the protocol ever produces or accepts.
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_WINDOW: usize = 10;

/// Fixed-size protocol header, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Byte offset of the first payload byte (current send offset for
    /// control packets).
    pub seq: u32,
    /// Cumulative next-expected byte offset; meaningful only with ACK.
    pub ack: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u16,
    /// Advertised receive window in bytes.  Carried, never enforced.
    pub window: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

/// Errors that can arise when framing or parsing a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Datagram shorter than the fixed header.
    #[error("malformed packet: {len} bytes is shorter than the 12-byte header")]
    Malformed { len: usize },
    /// Payload longer than [`MAX_PAYLOAD`].
    #[error("payload of {len} bytes exceeds the 1024-byte limit")]
    PayloadTooLarge { len: usize },
}

impl Packet {
    /// A data segment.  Data carries no flags on the wire.
    pub fn data(seq: u32, window: u16, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                seq,
                ack: 0,
                flags: 0,
                window,
            },
            payload,
        }
    }

    /// A payload-less packet carrying only `flags`.
    pub fn control(flags: u16, seq: u32, ack: u32, window: u16) -> Self {
        Self {
            header: Header {
                seq,
                ack,
                flags,
                window,
            },
            payload: Vec::new(),
        }
    }

    pub fn syn(isn: u32, window: u16) -> Self {
        Self::control(flags::SYN, isn, 0, window)
    }

    pub fn syn_ack(isn: u32, ack: u32, window: u16) -> Self {
        Self::control(flags::SYN | flags::ACK, isn, ack, window)
    }

    pub fn ack(seq: u32, ack: u32, window: u16) -> Self {
        Self::control(flags::ACK, seq, ack, window)
    }

    pub fn fin(seq: u32, window: u16) -> Self {
        Self::control(flags::FIN, seq, 0, window)
    }

    pub fn is_syn(&self) -> bool {
        self.header.flags & flags::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.header.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.header.flags & flags::FIN != 0
    }

    /// `true` for SYN and ACK both set.
    pub fn is_syn_ack(&self) -> bool {
        self.is_syn() && self.is_ack()
    }

    /// `true` when no control flag is set.  Only these packets are subject
    /// to loss injection.
    pub fn is_data(&self) -> bool {
        self.header.flags & (flags::SYN | flags::ACK | flags::FIN) == 0
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge { len: payload_len });
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + payload_len);
        buf.extend_from_slice(&self.header.seq.to_be_bytes());
        buf.extend_from_slice(&self.header.ack.to_be_bytes());
        buf.extend_from_slice(&self.header.flags.to_be_bytes());
        buf.extend_from_slice(&self.header.window.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a [`Packet`] from one received datagram.
    ///
    /// Everything after the header is payload.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Malformed { len: buf.len() });
        }
        let payload = &buf[HEADER_LEN..];
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge { len: payload.len() });
        }

        let be32 =
            |off: usize| u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        let be16 = |off: usize| u16::from_be_bytes([buf[off], buf[off + 1]]);

        Ok(Packet {
            header: Header {
                seq: be32(OFF_SEQ),
                ack: be32(OFF_ACK),
                flags: be16(OFF_FLAGS),
                window: be16(OFF_WINDOW),
            },
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::data(42, 4096, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn decode_empty_buffer_is_malformed() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::Malformed { len: 0 }));
    }

    #[test]
    fn decode_short_header_is_malformed() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::Malformed { len: HEADER_LEN - 1 })
        );
    }

    #[test]
    fn bare_header_decodes_with_empty_payload() {
        let decoded = Packet::decode(&[0u8; HEADER_LEN]).unwrap();
        assert!(decoded.payload.is_empty());
        assert!(decoded.is_data());
    }

    #[test]
    fn payload_length_follows_datagram_length() {
        let mut bytes = Packet::data(7, 0, vec![9u8; 10]).encode().unwrap();
        bytes.truncate(HEADER_LEN + 4);
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, vec![9u8; 4]);
    }

    #[test]
    fn oversized_payload_rejected_both_ways() {
        let pkt = Packet::data(0, 0, vec![0u8; MAX_PAYLOAD + 1]);
        assert_eq!(
            pkt.encode(),
            Err(PacketError::PayloadTooLarge { len: MAX_PAYLOAD + 1 })
        );
        let raw = vec![0u8; MAX_DATAGRAM + 1];
        assert!(matches!(
            Packet::decode(&raw),
            Err(PacketError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn full_payload_fits() {
        let pkt = Packet::data(1, 0, vec![0xab; MAX_PAYLOAD]);
        let bytes = pkt.encode().unwrap();
        assert_eq!(bytes.len(), MAX_DATAGRAM);
        assert_eq!(Packet::decode(&bytes).unwrap().payload.len(), MAX_PAYLOAD);
    }

    #[test]
    fn header_fields_big_endian_on_wire() {
        let pkt = Packet::control(flags::SYN | flags::ACK, 0x0102_0304, 0x0506_0708, 0x0a0b);
        let bytes = pkt.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[OFF_FLAGS..OFF_FLAGS + 2], &[0x00, 0x03]);
        assert_eq!(&bytes[OFF_WINDOW..OFF_WINDOW + 2], &[0x0a, 0x0b]);
    }

    #[test]
    fn flag_predicates() {
        assert!(Packet::syn(1, 0).is_syn());
        assert!(!Packet::syn(1, 0).is_ack());
        assert!(Packet::syn_ack(1, 2, 0).is_syn_ack());
        assert!(Packet::fin(5, 0).is_fin());
        assert!(Packet::ack(5, 6, 0).is_ack());
        assert!(!Packet::ack(5, 6, 0).is_data());
        assert!(Packet::data(5, 0, b"x".to_vec()).is_data());
    }
}
