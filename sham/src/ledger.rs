//! Retransmission ledger: the bounded set of in-flight, unacknowledged
//! data packets.
//!
//! Each [`RetransmitSlot`] keeps the exact bytes that went on the wire so a
//! retransmission is byte-for-byte identical to the original send.  Slots
//! are keyed by sequence offset, which keeps them ordered for cumulative
//! release and makes "one slot per outstanding packet" structural.
//!
//! The ledger never touches the socket; [`crate::sender::Sender`] owns it
//! and [`crate::connection::Connection`] does the I/O.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// One outstanding data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitSlot {
    /// Sequence offset of the first payload byte.
    pub seq: u32,
    /// Payload length in bytes.
    pub len: u32,
    /// Encoded datagram, resent unchanged.
    pub datagram: Vec<u8>,
    /// Time of the most recent (re)transmission.
    pub sent_at: Instant,
    /// Total number of transmissions (1 = first send).
    pub tx_count: u32,
}

impl RetransmitSlot {
    /// First offset *after* this packet's payload.
    pub fn end(&self) -> u32 {
        self.seq + self.len
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("retransmission ledger full ({0} slots)")]
    Full(usize),
    #[error("sequence offset {0} already has an outstanding slot")]
    Occupied(u32),
}

/// Capacity-bounded, seq-ordered map of in-flight packets.
#[derive(Debug)]
pub struct Ledger {
    slots: BTreeMap<u32, RetransmitSlot>,
    capacity: usize,
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupy a slot for a packet that was just transmitted at `now`.
    pub fn insert(
        &mut self,
        seq: u32,
        len: u32,
        datagram: Vec<u8>,
        now: Instant,
    ) -> Result<(), LedgerError> {
        if self.slots.len() >= self.capacity {
            return Err(LedgerError::Full(self.capacity));
        }
        if self.slots.contains_key(&seq) {
            return Err(LedgerError::Occupied(seq));
        }
        self.slots.insert(
            seq,
            RetransmitSlot {
                seq,
                len,
                datagram,
                sent_at: now,
                tx_count: 1,
            },
        );
        Ok(())
    }

    /// Free every slot whose whole byte range lies below `ack_num`, i.e.
    /// `seq + len <= ack_num`.  Returns how many slots were freed.
    pub fn release_below(&mut self, ack_num: u32) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.end() > ack_num);
        before - self.slots.len()
    }

    /// Refresh and return every slot last sent more than `rto` before
    /// `now`.  Each slot times out on its own; there is no shared timer.
    pub fn take_expired(&mut self, now: Instant, rto: Duration) -> Vec<&RetransmitSlot> {
        self.slots
            .values_mut()
            .filter(|slot| now.saturating_duration_since(slot.sent_at) > rto)
            .map(|slot| {
                slot.sent_at = now;
                slot.tx_count += 1;
                &*slot
            })
            .collect()
    }

    /// Outstanding slots from lowest to highest offset.
    pub fn iter(&self) -> impl Iterator<Item = &RetransmitSlot> {
        self.slots.values()
    }

    /// Drop everything, e.g. when a local close preempts the send loop.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(now: Instant, ranges: &[(u32, u32)]) -> Ledger {
        let mut l = Ledger::new(8);
        for &(seq, len) in ranges {
            l.insert(seq, len, vec![0u8; len as usize], now).unwrap();
        }
        l
    }

    #[test]
    fn release_requires_whole_range_below_ack() {
        let now = Instant::now();
        let mut l = ledger_with(now, &[(100, 10), (110, 10), (120, 10)]);

        // 115 covers only the first packet fully.
        assert_eq!(l.release_below(115), 1);
        // Exactly the end of the second packet frees it.
        assert_eq!(l.release_below(120), 1);
        assert_eq!(l.len(), 1);
        assert_eq!(l.iter().next().unwrap().seq, 120);
    }

    #[test]
    fn cumulative_release_frees_many() {
        let now = Instant::now();
        let mut l = ledger_with(now, &[(0, 5), (5, 5), (10, 5)]);
        assert_eq!(l.release_below(15), 3);
        assert!(l.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let now = Instant::now();
        let mut l = Ledger::new(2);
        l.insert(0, 1, vec![0], now).unwrap();
        l.insert(1, 1, vec![0], now).unwrap();
        assert_eq!(l.insert(2, 1, vec![0], now), Err(LedgerError::Full(2)));
    }

    #[test]
    fn duplicate_offset_rejected() {
        let now = Instant::now();
        let mut l = Ledger::new(4);
        l.insert(7, 3, vec![1, 2, 3], now).unwrap();
        assert_eq!(l.insert(7, 3, vec![1, 2, 3], now), Err(LedgerError::Occupied(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_per_slot() {
        let rto = Duration::from_millis(500);
        let mut l = Ledger::new(4);
        l.insert(0, 4, b"aaaa".to_vec(), Instant::now()).unwrap();

        tokio::time::advance(Duration::from_millis(300)).await;
        l.insert(4, 4, b"bbbb".to_vec(), Instant::now()).unwrap();

        tokio::time::advance(Duration::from_millis(250)).await;
        let expired: Vec<u32> = l.take_expired(Instant::now(), rto).iter().map(|s| s.seq).collect();
        assert_eq!(expired, vec![0]);

        // The refreshed slot is not due again straight away.
        assert!(l.take_expired(Instant::now(), rto).is_empty());

        tokio::time::advance(Duration::from_millis(300)).await;
        let expired = l.take_expired(Instant::now(), rto);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].seq, 4);
        assert_eq!(expired[0].datagram, b"bbbb".to_vec());
        assert_eq!(expired[0].tx_count, 2);
    }
}
