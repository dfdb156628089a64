//! Artificial packet loss for exercising retransmission.
//!
//! Real networks drop packets; loopback almost never does.  The
//! [`LossSimulator`] sits at the receive boundary of a connection and
//! discards inbound **data** packets with a fixed probability.  SYN, ACK and
//! FIN packets always pass, so loss only ever hits the sliding window.
//!
//! The generator is a seedable [`StdRng`]: with a fixed seed the sequence of
//! drop decisions is reproducible, which keeps loss tests deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::Packet;

/// Uniform-random drop of inbound data packets.
#[derive(Debug)]
pub struct LossSimulator {
    rate: f64,
    rng: StdRng,
    dropped: u64,
}

impl LossSimulator {
    /// `rate` is the drop probability in `[0, 1)`; `seed = None` seeds from
    /// the operating system.
    pub fn new(rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rate,
            rng,
            dropped: 0,
        }
    }

    /// A simulator that never drops anything.
    pub fn disabled() -> Self {
        Self::new(0.0, Some(0))
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Number of packets discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Decide whether `packet` is lost.  Control packets never are, and no
    /// random number is drawn for them.
    pub fn should_drop(&mut self, packet: &Packet) -> bool {
        if self.rate <= 0.0 || !packet.is_data() {
            return false;
        }
        let lost = self.rng.random::<f64>() < self.rate;
        if lost {
            self.dropped += 1;
        }
        lost
    }
}
