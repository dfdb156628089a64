//! Tunable protocol parameters.
//!
//! Every knob the engine exposes lives in [`ShamConfig`].  The defaults are
//! the reference values: a 10-packet window, 128 ledger slots, a fixed
//! 500 ms RTO and a 5 s handshake deadline.

use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// Default number of data packets allowed in flight at once.
pub const SND_WND_PACKETS: usize = 10;

/// Default capacity of the retransmission ledger.
pub const MAX_SENT_SLOTS: usize = 128;

/// Default (and fixed) retransmission timeout.
pub const RTO: Duration = Duration::from_millis(500);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ShamConfig {
    /// Sliding-window capacity in packets.
    pub window_packets: usize,
    /// Maximum number of tracked in-flight packets.
    pub max_slots: usize,
    /// Fixed retransmission timeout; no RTT sampling, no back-off.
    pub rto: Duration,
    /// Largest payload placed in a single data packet.
    pub max_payload: usize,
    /// Deadline for each handshake attempt.
    pub handshake_timeout: Duration,
    /// Safety deadline for the whole close sequence.
    pub teardown_timeout: Duration,
    /// Time spent in `TIME_WAIT` re-acknowledging a retransmitted FIN.
    pub linger: Duration,
    /// Upper bound on a single wait for an inbound datagram.
    pub poll_interval: Duration,
    /// Value written into the `window_size` header field.
    pub advertised_window: u16,
    /// Probability of discarding an inbound data packet.
    pub loss_rate: f64,
    /// Seed for the loss generator; `None` seeds from the OS.
    pub loss_seed: Option<u64>,
}

impl Default for ShamConfig {
    fn default() -> Self {
        Self {
            window_packets: SND_WND_PACKETS,
            max_slots: MAX_SENT_SLOTS,
            rto: RTO,
            max_payload: MAX_PAYLOAD,
            handshake_timeout: Duration::from_millis(5000),
            teardown_timeout: Duration::from_millis(5000),
            linger: RTO * 2,
            poll_interval: Duration::from_millis(10),
            advertised_window: u16::MAX,
            loss_rate: 0.0,
            loss_seed: None,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("window must hold at least one packet")]
    EmptyWindow,
    #[error("window of {window} packets exceeds the {slots} ledger slots")]
    WindowExceedsSlots { window: usize, slots: usize },
    #[error("max payload {0} is outside 1..=1024")]
    BadPayload(usize),
    #[error("loss rate {0} is outside [0, 1)")]
    BadLossRate(f64),
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
}

impl ShamConfig {
    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_packets == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.window_packets > self.max_slots {
            return Err(ConfigError::WindowExceedsSlots {
                window: self.window_packets,
                slots: self.max_slots,
            });
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(ConfigError::BadPayload(self.max_payload));
        }
        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(ConfigError::BadLossRate(self.loss_rate));
        }
        if self.rto.is_zero() {
            return Err(ConfigError::ZeroDuration("rto"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("poll_interval"));
        }
        Ok(())
    }

    /// Same configuration with artificial loss on inbound data packets.
    pub fn with_loss(mut self, rate: f64, seed: Option<u64>) -> Self {
        self.loss_rate = rate;
        self.loss_seed = seed;
        self
    }
}
