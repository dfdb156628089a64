//! Sliding-window send-side state.
//!
//! [`Sender`] turns outbound chunks into sequenced data packets and tracks
//! which of them are still unacknowledged.  Multiple packets may be in
//! flight, up to the configured window.
//!
//! # Protocol contract
//!
//! - At most `window` packets are outstanding at once.
//! - ACKs are **cumulative**: `ack_num = K` means the peer has every byte
//!   below offset `K`.  One ACK can release many packets.
//! - An ACK that does not advance `send_acked_through` is ignored, so
//!   `send_acked_through` never moves backwards.
//! - Each outstanding packet times out on its own and is resent unchanged.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.
//!
//! # Sequence-number layout
//!
//! ```text
//!  send_acked_through + 1      send_next
//!          │                       │
//!  ────────┼───────────────────────┼──────────────▶ byte offsets
//!          │ <──── in flight ────▶ │ <── sendable
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::ledger::{Ledger, LedgerError, RetransmitSlot};
use crate::packet::{Packet, PacketError};

/// Send-side state for one connection.
#[derive(Debug)]
pub struct Sender {
    /// Offset of the next byte to transmit.
    pub send_next: u32,

    /// Highest cumulatively acknowledged offset (`ack_num - 1`).
    pub send_acked_through: u32,

    /// Maximum number of packets in flight.
    window: usize,

    ledger: Ledger,
}

impl Sender {
    /// Create a sender whose first data byte will carry offset `first_seq`
    /// (local ISN + 1 after the handshake).
    pub fn new(first_seq: u32, window: usize, max_slots: usize) -> Self {
        Self {
            send_next: first_seq,
            send_acked_through: first_seq.wrapping_sub(1),
            window: window.min(max_slots),
            ledger: Ledger::new(max_slots),
        }
    }

    /// `true` when one more packet fits in the window.
    pub fn can_send(&self) -> bool {
        self.ledger.len() < self.window
    }

    /// Number of packets awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.ledger.len()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Every transmitted byte has been acknowledged.
    pub fn is_drained(&self) -> bool {
        self.ledger.is_empty() && self.send_acked_through.wrapping_add(1) == self.send_next
    }

    /// Build the next data packet, encode it and occupy a ledger slot.
    ///
    /// Returns the datagram to put on the wire.  `send_next` advances by the
    /// payload length.
    pub fn send_chunk(
        &mut self,
        payload: Vec<u8>,
        window_field: u16,
        now: Instant,
    ) -> Result<Vec<u8>, SendError> {
        if !self.can_send() {
            return Err(SendError::Ledger(LedgerError::Full(self.window)));
        }
        let len = payload.len() as u32;
        let seq = self.send_next;
        let datagram = Packet::data(seq, window_field, payload).encode()?;
        self.ledger.insert(seq, len, datagram.clone(), now)?;
        self.send_next = seq + len;
        Ok(datagram)
    }

    /// Process a cumulative ACK.
    ///
    /// Frees every packet lying entirely below `ack_num` and returns how
    /// many were freed.  Duplicate, stale, and beyond-`send_next` ACKs
    /// return `0` and leave all state untouched.
    pub fn on_ack(&mut self, ack_num: u32) -> usize {
        if ack_num <= self.send_acked_through.wrapping_add(1) || ack_num > self.send_next {
            return 0;
        }
        let freed = self.ledger.release_below(ack_num);
        self.send_acked_through = ack_num - 1;
        freed
    }

    /// Packets whose RTO elapsed; their timestamps are refreshed.
    pub fn take_expired(&mut self, now: Instant, rto: Duration) -> Vec<&RetransmitSlot> {
        self.ledger.take_expired(now, rto)
    }

    /// In-flight packets, oldest first.
    pub fn outstanding(&self) -> impl Iterator<Item = &RetransmitSlot> {
        self.ledger.iter()
    }

    /// Forget every in-flight packet.  Used when a local close preempts
    /// the send loop.
    pub fn abandon(&mut self) -> usize {
        let n = self.ledger.len();
        self.ledger.clear();
        n
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}
