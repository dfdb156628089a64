//! Retransmit timers and phase deadlines.
//!
//! SHAM uses a **fixed** retransmission timeout: there is no RTT sampling
//! and no exponential back-off.  Two small types cover every timed action
//! outside the sliding window (which keeps one timestamp per ledger slot):
//! - [`RetransmitTimer`]: re-arms after each (re)transmission of a single
//!   control packet (SYN+ACK while in `SYN_RECEIVED`, FIN while closing).
//! - [`Deadline`]: a wall-clock bound on a whole phase (handshake,
//!   teardown, linger).
//!
//! Both read `tokio::time::Instant`, so tests running on a paused clock
//! observe the same behaviour as real time.

use std::time::Duration;

use tokio::time::Instant;

/// Fixed-RTO timer for one outstanding control packet.
#[derive(Debug, Clone, Copy)]
pub struct RetransmitTimer {
    rto: Duration,
    last_sent: Instant,
}

impl RetransmitTimer {
    /// Arm the timer as if the packet had just been sent.
    pub fn start(rto: Duration) -> Self {
        Self {
            rto,
            last_sent: Instant::now(),
        }
    }

    /// `true` once more than one RTO has elapsed since the last send.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_sent) > self.rto
    }

    /// Record a retransmission.
    pub fn rearm(&mut self, now: Instant) {
        self.last_sent = now;
    }
}

/// Absolute end of a bounded phase.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// `poll` clipped to the time left, so a wait never overshoots.
    pub fn clip(&self, poll: Duration) -> Duration {
        poll.min(self.remaining())
    }
}
