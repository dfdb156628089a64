//! Go-back-N receive-side state.
//!
//! [`Receiver`] keeps a single counter, `recv_expected`:
//!
//! - Only the segment starting exactly at `recv_expected` is accepted.
//! - Anything else (a retransmitted duplicate, or a segment ahead of a gap)
//!   is **discarded**; nothing is buffered out of order.
//! - After every segment, accepted or not, the caller sends a cumulative
//!   ACK carrying [`Receiver::ack_number`].  Repeating the same ACK across a
//!   gap is what makes the peer's timers fire.
//!
//! There are no receive-side timers.  Socket I/O and delivery to the
//! application belong to the caller.

/// What happened to one inbound segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// In order; the payload must be delivered.
    InOrder(&'a [u8]),
    /// Starts below `recv_expected`: already delivered.
    Duplicate,
    /// Starts beyond `recv_expected`: an earlier segment is missing.
    Ahead,
}

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    /// Next byte offset expected from the peer.
    pub recv_expected: u32,
}

impl Receiver {
    /// `recv_expected` starts at the peer's ISN + 1.
    pub fn new(recv_expected: u32) -> Self {
        Self { recv_expected }
    }

    /// Classify an inbound segment and advance past it when in order.
    pub fn on_segment<'a>(&mut self, seq: u32, payload: &'a [u8]) -> Segment<'a> {
        if seq == self.recv_expected {
            self.recv_expected += payload.len() as u32;
            Segment::InOrder(payload)
        } else if seq < self.recv_expected {
            Segment::Duplicate
        } else {
            Segment::Ahead
        }
    }

    /// Cumulative ACK number for the next outbound ACK.
    pub fn ack_number(&self) -> u32 {
        self.recv_expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_segment_accepted() {
        let mut r = Receiver::new(100);
        assert_eq!(r.on_segment(100, b"hello"), Segment::InOrder(b"hello"));
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn out_of_order_segment_discarded() {
        let mut r = Receiver::new(100);
        assert_eq!(r.on_segment(110, b"future"), Segment::Ahead);
        // The cumulative ACK still advertises the gap.
        assert_eq!(r.ack_number(), 100);
    }

    #[test]
    fn duplicate_is_never_redelivered() {
        let mut r = Receiver::new(100);
        assert!(matches!(r.on_segment(100, b"hello"), Segment::InOrder(_)));
        assert_eq!(r.on_segment(100, b"hello"), Segment::Duplicate);
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn sequential_segments_advance() {
        let mut r = Receiver::new(0);
        let mut delivered = Vec::new();
        for (seq, data) in [(0u32, &b"abc"[..]), (3, &b"de"[..]), (5, &b"fghi"[..])] {
            if let Segment::InOrder(p) = r.on_segment(seq, data) {
                delivered.extend_from_slice(p);
            }
        }
        assert_eq!(delivered, b"abcdefghi");
        assert_eq!(r.ack_number(), 9);
    }

    #[test]
    fn gap_then_fill_accepts_only_in_order() {
        let mut r = Receiver::new(0);
        assert_eq!(r.on_segment(5, b"world"), Segment::Ahead);
        assert!(matches!(r.on_segment(0, b"hello"), Segment::InOrder(_)));
        // The earlier copy of seq=5 was dropped; the retransmission lands.
        assert!(matches!(r.on_segment(5, b"world"), Segment::InOrder(_)));
        assert_eq!(r.ack_number(), 10);
    }

    #[test]
    fn empty_payload_at_expected_offset_is_harmless() {
        let mut r = Receiver::new(42);
        assert_eq!(r.on_segment(42, b""), Segment::InOrder(b""));
        assert_eq!(r.ack_number(), 42);
    }
}
