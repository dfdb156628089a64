//! Per-connection lifecycle: handshake, sliding-window transfer, teardown.
//!
//! A [`Connection`] owns the complete state for one peer-to-peer session:
//! its [`Socket`], the FSM state, the [`Sender`] (and through it the
//! retransmission ledger), the [`Receiver`], the loss hook and the
//! configuration.  One tokio task drives one connection; nothing is shared.
//!
//! # Lifecycle
//!
//! ```ignore
//! // initiator
//! let mut conn = Connection::connect(socket, server, ShamConfig::default()).await?;
//! let stats = conn.run(&mut source, &mut sink, ClosePolicy::WhenDrained).await?;
//!
//! // responder
//! let mut conn = Connection::accept(socket, ShamConfig::default()).await?;
//! let stats = conn.run(&mut EmptySource, &mut sink, ClosePolicy::AwaitPeer).await?;
//! ```
//!
//! # The transfer loop
//!
//! Every iteration of [`Connection::run`]:
//! 1. fills the window from the [`ByteSource`] (≤ `max_payload` per packet),
//! 2. decides whether to start the close sequence ([`ClosePolicy`]),
//! 3. waits at most `poll_interval` for one inbound datagram (or the close
//!    signal) and processes it,
//! 4. retransmits, unchanged, every ledger slot whose RTO elapsed.
//!
//! Inbound data is handled go-back-N: only the segment at `recv_expected` is
//! delivered, and every data packet is answered with a cumulative ACK.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::{ConfigError, ShamConfig};
use crate::packet::Packet;
use crate::receiver::{Receiver, Segment};
use crate::sender::{SendError, Sender};
use crate::simulator::LossSimulator;
use crate::socket::{Socket, SocketError};
use crate::state::{ConnectionState, Role};
use crate::stream::{ByteSink, ByteSource, Chunk, Discard};
use crate::timer::{Deadline, RetransmitTimer};

/// Errors surfaced by connection operations.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("handshake did not complete before the deadline")]
    HandshakeTimeout,
    #[error("teardown did not complete before the deadline")]
    TeardownTimeout,
    #[error("transport error: {0}")]
    Transport(#[from] SocketError),
    #[error("operation not valid in state {0}")]
    BadState(ConnectionState),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("application stream error: {0}")]
    Io(#[from] io::Error),
    #[error("send window error: {0}")]
    Send(#[from] SendError),
}

/// When [`Connection::run`] starts the close sequence.
#[derive(Debug)]
pub enum ClosePolicy {
    /// Active close once the source is exhausted and every byte is acked.
    WhenDrained,
    /// Never close first; wait for the peer's FIN, then close passively.
    AwaitPeer,
    /// Close as soon as the signal fires (or its sender is dropped), even
    /// with data still in flight.  Outstanding packets are abandoned.
    OnSignal(oneshot::Receiver<()>),
}

/// Counters for one completed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Payload bytes handed to the window (first transmissions only).
    pub bytes_sent: u64,
    /// Payload bytes delivered in order to the sink.
    pub bytes_delivered: u64,
    /// Data packets transmitted for the first time.
    pub packets_sent: u64,
    /// Data packets transmitted again after an RTO.
    pub retransmissions: u64,
    /// Inbound data packets discarded by the loss hook.
    pub dropped: u64,
    /// Inbound data segments discarded as duplicate or out of order.
    pub discarded: u64,
    /// The close sequence hit its safety deadline.
    pub teardown_timed_out: bool,
}

/// Random initial sequence number in `[0, 2^31)`.
pub fn random_isn() -> u32 {
    rand::rng().random::<u32>() & 0x7fff_ffff
}

/// Why the transfer loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Drained,
    PeerClosed,
    /// The peer sent FIN but stopped acknowledging our data.
    PeerGone,
    Signalled,
}

/// A reliable SHAM connection over one UDP socket.
#[derive(Debug)]
pub struct Connection {
    /// Current FSM state.
    pub state: ConnectionState,
    /// Side of the handshake this endpoint played.
    pub role: Role,
    /// ISN chosen by this endpoint.
    pub local_isn: u32,
    /// ISN announced by the peer (valid once the handshake has seen it).
    pub peer_isn: u32,
    /// Outbound window and retransmission ledger.
    pub sender: Sender,
    /// Inbound go-back-N state.
    pub receiver: Receiver,

    socket: Socket,
    /// `None` while listening.
    peer: Option<SocketAddr>,
    config: ShamConfig,
    loss: LossSimulator,
    /// Sequence offset of the peer's FIN once seen.
    peer_fin: Option<u32>,
    stats: SessionStats,
}

impl Connection {
    fn new(
        socket: Socket,
        peer: Option<SocketAddr>,
        role: Role,
        config: ShamConfig,
    ) -> Result<Self, ConnError> {
        config.validate()?;
        let local_isn = random_isn();
        Ok(Self {
            state: ConnectionState::Closed,
            role,
            local_isn,
            peer_isn: 0,
            sender: Sender::new(local_isn + 1, config.window_packets, config.max_slots),
            receiver: Receiver::new(0),
            socket,
            peer,
            loss: LossSimulator::new(config.loss_rate, config.loss_seed),
            peer_fin: None,
            stats: SessionStats::default(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn config(&self) -> &ShamConfig {
        &self.config
    }

    /// Counters so far.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            dropped: self.loss.dropped(),
            ..self.stats.clone()
        }
    }

    // ─── Handshake ──────────────────────────────────────────────────────────

    /// Active open: send one SYN to `peer` and wait for SYN+ACK.
    ///
    /// The SYN itself is never retransmitted.  A bare SYN from the peer
    /// while waiting is a simultaneous open and is answered with SYN+ACK.
    pub async fn connect(
        socket: Socket,
        peer: SocketAddr,
        config: ShamConfig,
    ) -> Result<Self, ConnError> {
        let mut conn = Self::new(socket, Some(peer), Role::Initiator, config)?;

        let syn = Packet::syn(conn.local_isn, conn.config.advertised_window);
        conn.socket.send_to(&syn, peer).await?;
        conn.state = ConnectionState::SynSent;
        log::debug!("SND SYN SEQ={} to {peer}", conn.local_isn);

        match conn.finish_handshake().await {
            Ok(()) => Ok(conn),
            Err(e) => {
                conn.state = ConnectionState::Closed;
                log::warn!("connect to {peer} failed: {e}");
                Err(e)
            }
        }
    }

    /// Passive open: a connection in `LISTEN`, ready for
    /// [`Connection::accept_handshake`].
    pub fn listen(socket: Socket, config: ShamConfig) -> Result<Self, ConnError> {
        let mut conn = Self::new(socket, None, Role::Responder, config)?;
        conn.state = ConnectionState::Listen;
        log::debug!("LISTEN on {}", conn.socket.local_addr);
        Ok(conn)
    }

    /// Run one handshake attempt from `LISTEN`.
    ///
    /// Waits without limit for a SYN, then gives the ACK of its SYN+ACK one
    /// handshake deadline.  On timeout the connection is back in `LISTEN`.
    pub async fn accept_handshake(&mut self) -> Result<(), ConnError> {
        if self.state != ConnectionState::Listen {
            return Err(ConnError::BadState(self.state));
        }

        let from = loop {
            let Some((pkt, from)) = self.recv(self.config.poll_interval).await else {
                continue;
            };
            if pkt.is_syn() && !pkt.is_ack() {
                self.peer = Some(from);
                self.local_isn = random_isn();
                self.sender = Sender::new(
                    self.local_isn + 1,
                    self.config.window_packets,
                    self.config.max_slots,
                );
                self.learn_peer_isn(pkt.header.seq);
                break from;
            }
            log::debug!("LISTEN ignoring flags={:#x} from {from}", pkt.header.flags);
        };
        log::debug!("RCV SYN SEQ={} from {from}", self.peer_isn);

        self.send_syn_ack().await;
        self.state = ConnectionState::SynReceived;

        match self.finish_handshake().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ConnectionState::Listen;
                self.peer = None;
                log::warn!("handshake with {from} abandoned: {e}");
                Err(e)
            }
        }
    }

    /// Listen on `socket` until a handshake completes.  Failed attempts are
    /// logged and the responder keeps listening.
    pub async fn accept(socket: Socket, config: ShamConfig) -> Result<Self, ConnError> {
        let mut conn = Self::listen(socket, config)?;
        loop {
            match conn.accept_handshake().await {
                Ok(()) => return Ok(conn),
                Err(ConnError::HandshakeTimeout) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn finish_handshake(&mut self) -> Result<(), ConnError> {
        let deadline = Deadline::after(self.config.handshake_timeout);
        let mut syn_ack_timer = RetransmitTimer::start(self.config.rto);

        while !deadline.expired() {
            let before = self.state;
            if let Some((pkt, _)) = self.recv(deadline.clip(self.config.poll_interval)).await {
                match self.state {
                    ConnectionState::SynSent => self.on_syn_sent(&pkt).await,
                    ConnectionState::SynReceived => self.on_syn_received(&pkt).await,
                    _ => {}
                }
            }
            if self.state == ConnectionState::Established {
                log::info!(
                    "ESTABLISHED with {:?} as {} (isn={} peer_isn={})",
                    self.peer,
                    self.role,
                    self.local_isn,
                    self.peer_isn
                );
                return Ok(());
            }

            let now = Instant::now();
            if before != ConnectionState::SynReceived && self.state == ConnectionState::SynReceived {
                syn_ack_timer.rearm(now);
            } else if self.state == ConnectionState::SynReceived && syn_ack_timer.is_due(now) {
                log::debug!("TIMEOUT SYN-ACK SEQ={}", self.local_isn);
                self.send_syn_ack().await;
                syn_ack_timer.rearm(now);
            }
        }
        Err(ConnError::HandshakeTimeout)
    }

    async fn on_syn_sent(&mut self, pkt: &Packet) {
        let isn_ack = self.local_isn + 1;
        if pkt.is_syn_ack() {
            if pkt.header.ack != isn_ack {
                log::debug!("RCV SYN-ACK ACK={} (want {isn_ack}); ignored", pkt.header.ack);
                return;
            }
            self.learn_peer_isn(pkt.header.seq);
            log::debug!("RCV SYN-ACK SEQ={} ACK={}", pkt.header.seq, pkt.header.ack);
            self.send_handshake_ack().await;
            self.state = ConnectionState::Established;
        } else if pkt.is_syn() {
            self.learn_peer_isn(pkt.header.seq);
            log::debug!("RCV SYN SEQ={} in SYN_SENT; simultaneous open", pkt.header.seq);
            self.send_syn_ack().await;
            self.state = ConnectionState::SynReceived;
        }
    }

    async fn on_syn_received(&mut self, pkt: &Packet) {
        let isn_ack = self.local_isn + 1;
        if pkt.is_syn_ack() {
            // Simultaneous open: the peer's own SYN+ACK completes it.
            if pkt.header.ack == isn_ack && pkt.header.seq == self.peer_isn {
                self.send_handshake_ack().await;
                self.state = ConnectionState::Established;
            }
        } else if pkt.is_ack() {
            if pkt.header.ack == isn_ack {
                log::debug!("RCV ACK FOR SYN");
                self.state = ConnectionState::Established;
            }
        } else if pkt.is_syn() && pkt.header.seq == self.peer_isn {
            log::debug!("RCV SYN SEQ={} again", pkt.header.seq);
            self.send_syn_ack().await;
        }
    }

    fn learn_peer_isn(&mut self, isn: u32) {
        self.peer_isn = isn;
        self.receiver = Receiver::new(isn.wrapping_add(1));
    }

    async fn send_syn_ack(&mut self) {
        let pkt = Packet::syn_ack(
            self.local_isn,
            self.peer_isn.wrapping_add(1),
            self.config.advertised_window,
        );
        log::debug!("SND SYN-ACK SEQ={} ACK={}", pkt.header.seq, pkt.header.ack);
        self.send_control(&pkt).await;
    }

    async fn send_handshake_ack(&mut self) {
        let pkt = Packet::ack(
            self.local_isn + 1,
            self.peer_isn.wrapping_add(1),
            self.config.advertised_window,
        );
        log::debug!("SND ACK FOR SYN");
        self.send_control(&pkt).await;
    }

    // ─── Transfer ───────────────────────────────────────────────────────────

    /// Move bytes from `source` to the peer and from the peer to `sink`
    /// until `policy` (or the peer) ends the session, then close.
    ///
    /// A teardown that hits its deadline is reported in the returned
    /// [`SessionStats`], not as an error.  After the peer's FIN our
    /// unacknowledged data gets one teardown timeout without ACK progress
    /// before it is abandoned.
    pub async fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        policy: ClosePolicy,
    ) -> Result<SessionStats, ConnError>
    where
        S: ByteSource + ?Sized,
        K: ByteSink + ?Sized,
    {
        if !self.state.can_send_data() {
            return Err(ConnError::BadState(self.state));
        }

        let close_when_drained = matches!(policy, ClosePolicy::WhenDrained);
        let mut signal = match policy {
            ClosePolicy::OnSignal(rx) => Some(rx),
            _ => None,
        };
        let mut source_done = false;
        // Bounds CLOSE_WAIT: restarted by every ACK that makes progress.
        let mut peer_gone: Option<Deadline> = None;

        let exit = loop {
            while !source_done && self.sender.can_send() {
                match source.read_chunk(self.config.max_payload)? {
                    Chunk::Data(bytes) => self.send_data(bytes).await?,
                    Chunk::Pending => break,
                    Chunk::End => {
                        log::debug!("source exhausted at seq={}", self.sender.send_next);
                        source_done = true;
                    }
                }
            }

            if close_when_drained && source_done && self.sender.is_drained() {
                break Exit::Drained;
            }
            if self.peer_fin.is_some() && self.sender.is_drained() {
                break Exit::PeerClosed;
            }
            if peer_gone.as_ref().is_some_and(Deadline::expired) {
                log::warn!("peer closed and stopped acknowledging; abandoning unacked data");
                self.stats.teardown_timed_out = true;
                break Exit::PeerGone;
            }

            let wait = self.config.poll_interval;
            let inbound = match signal.as_mut() {
                Some(rx) => tokio::select! {
                    _ = rx => break Exit::Signalled,
                    got = self.recv(wait) => got,
                },
                None => self.recv(wait).await,
            };
            let acked_before = self.sender.send_acked_through;
            if let Some((pkt, _)) = inbound {
                self.on_packet(pkt, sink).await?;
            }
            let progressed = self.sender.send_acked_through != acked_before;
            if self.peer_fin.is_some() && (peer_gone.is_none() || progressed) {
                peer_gone = Some(Deadline::after(self.config.teardown_timeout));
            }

            self.retransmit_expired().await;
        };
        log::debug!("transfer loop finished ({exit:?}) in {}", self.state);

        match self.close_inner(sink).await {
            Ok(()) => {}
            Err(ConnError::TeardownTimeout) => self.stats.teardown_timed_out = true,
            Err(e) => return Err(e),
        }
        Ok(self.stats())
    }

    async fn send_data(&mut self, payload: Vec<u8>) -> Result<(), ConnError> {
        let len = payload.len();
        let seq = self.sender.send_next;
        let datagram =
            self.sender
                .send_chunk(payload, self.config.advertised_window, Instant::now())?;
        self.stats.bytes_sent += len as u64;
        self.stats.packets_sent += 1;
        log::debug!("SND DATA SEQ={seq} LEN={len}");
        self.send_datagram(&datagram).await;
        Ok(())
    }

    async fn retransmit_expired(&mut self) {
        let expired: Vec<(u32, u32, u32, Vec<u8>)> = self
            .sender
            .take_expired(Instant::now(), self.config.rto)
            .into_iter()
            .map(|slot| (slot.seq, slot.len, slot.tx_count, slot.datagram.clone()))
            .collect();
        for (seq, len, tx_count, datagram) in expired {
            self.stats.retransmissions += 1;
            log::debug!("TIMEOUT SEQ={seq}");
            log::debug!("RETX DATA SEQ={seq} LEN={len} (tx #{tx_count})");
            self.send_datagram(&datagram).await;
        }
    }

    /// Process one inbound packet outside the handshake.
    async fn on_packet<K>(&mut self, pkt: Packet, sink: &mut K) -> Result<(), ConnError>
    where
        K: ByteSink + ?Sized,
    {
        let h = pkt.header;

        if pkt.is_syn_ack() {
            // Our handshake ACK was lost and the responder is retrying.
            if h.ack == self.local_isn + 1 && h.seq == self.peer_isn {
                log::debug!("RCV SYN-ACK SEQ={} again", h.seq);
                self.send_handshake_ack().await;
            }
            return Ok(());
        }
        if pkt.is_syn() {
            log::debug!("RCV SYN SEQ={} ignored", h.seq);
            return Ok(());
        }

        if pkt.is_fin() {
            let fin_ack = Packet::ack(
                self.sender.send_next,
                h.seq.wrapping_add(1),
                self.config.advertised_window,
            );
            log::debug!("RCV FIN SEQ={}", h.seq);
            log::debug!("SND ACK FOR FIN");
            self.send_control(&fin_ack).await;
            if self.peer_fin.is_none() {
                self.peer_fin = Some(h.seq);
            }
            if self.state == ConnectionState::Established {
                self.state = ConnectionState::CloseWait;
            }
            return Ok(());
        }

        if pkt.is_ack() {
            let freed = self.sender.on_ack(h.ack);
            if freed > 0 {
                log::debug!("RCV ACK={} in_flight={}", h.ack, self.sender.in_flight());
            }
            return Ok(());
        }

        match self.receiver.on_segment(h.seq, &pkt.payload) {
            Segment::InOrder(bytes) => {
                sink.deliver(bytes)?;
                self.stats.bytes_delivered += bytes.len() as u64;
                log::debug!("RCV DATA SEQ={} LEN={}", h.seq, bytes.len());
            }
            Segment::Duplicate | Segment::Ahead => {
                self.stats.discarded += 1;
                log::debug!(
                    "RCV DATA SEQ={} LEN={} discarded (expected {})",
                    h.seq,
                    pkt.payload.len(),
                    self.receiver.recv_expected
                );
            }
        }
        let ack = Packet::ack(
            self.sender.send_next,
            self.receiver.ack_number(),
            self.config.advertised_window,
        );
        log::debug!("SND ACK={} WIN={}", ack.header.ack, ack.header.window);
        self.send_control(&ack).await;
        Ok(())
    }

    // ─── Teardown ───────────────────────────────────────────────────────────

    /// Close the connection.  Active from `ESTABLISHED`, passive from
    /// `CLOSE_WAIT`.  Packets still in flight are abandoned and data that
    /// arrives meanwhile is acknowledged but discarded.
    pub async fn close(&mut self) -> Result<(), ConnError> {
        self.close_inner(&mut Discard).await
    }

    async fn close_inner<K>(&mut self, sink: &mut K) -> Result<(), ConnError>
    where
        K: ByteSink + ?Sized,
    {
        let abandoned = self.sender.abandon();
        if abandoned > 0 {
            log::warn!("closing with {abandoned} packet(s) unacknowledged");
        }
        match self.state {
            ConnectionState::Established => self.active_close(sink).await,
            ConnectionState::CloseWait => self.passive_close(sink).await,
            ConnectionState::Closed => Ok(()),
            other => Err(ConnError::BadState(other)),
        }
    }

    async fn active_close<K>(&mut self, sink: &mut K) -> Result<(), ConnError>
    where
        K: ByteSink + ?Sized,
    {
        let fin_seq = self.sender.send_next;
        let fin = Packet::fin(fin_seq, self.config.advertised_window);
        log::debug!("SND FIN SEQ={fin_seq}");
        self.send_control(&fin).await;
        self.state = ConnectionState::FinWait;

        let deadline = Deadline::after(self.config.teardown_timeout);
        let mut timer = RetransmitTimer::start(self.config.rto);
        let mut fin_acked = false;

        while !(fin_acked && self.peer_fin.is_some()) {
            if deadline.expired() {
                self.state = ConnectionState::Closed;
                log::warn!("teardown deadline hit in FIN_WAIT/CLOSING; closing anyway");
                return Err(ConnError::TeardownTimeout);
            }

            if let Some((pkt, _)) = self.recv(deadline.clip(self.config.poll_interval)).await {
                let acks_fin = pkt.is_ack() && !pkt.is_syn() && pkt.header.ack == fin_seq + 1;
                if acks_fin && !fin_acked {
                    log::debug!("RCV ACK FOR FIN");
                    fin_acked = true;
                }
                // A combined FIN|ACK still carries the peer's FIN.
                if !acks_fin || pkt.is_fin() {
                    self.on_packet(pkt, sink).await?;
                }
                self.state = if self.peer_fin.is_some() && !fin_acked {
                    ConnectionState::Closing
                } else {
                    ConnectionState::FinWait
                };
            }

            let now = Instant::now();
            if !fin_acked && timer.is_due(now) {
                log::debug!("TIMEOUT on FIN, RETX FIN SEQ={fin_seq}");
                self.send_control(&fin).await;
                timer.rearm(now);
            }
        }

        self.state = ConnectionState::TimeWait;
        log::debug!("TIME_WAIT for {:?}", self.config.linger);
        let linger = Deadline::after(self.config.linger);
        while !linger.expired() {
            if let Some((pkt, _)) = self.recv(linger.clip(self.config.poll_interval)).await {
                self.on_packet(pkt, sink).await?;
            }
        }

        self.state = ConnectionState::Closed;
        log::info!("CLOSED");
        Ok(())
    }

    async fn passive_close<K>(&mut self, sink: &mut K) -> Result<(), ConnError>
    where
        K: ByteSink + ?Sized,
    {
        let fin_seq = self.sender.send_next;
        let fin = Packet::fin(fin_seq, self.config.advertised_window);
        log::debug!("SND FIN SEQ={fin_seq}");
        self.send_control(&fin).await;
        self.state = ConnectionState::LastAck;

        let deadline = Deadline::after(self.config.teardown_timeout);
        let mut timer = RetransmitTimer::start(self.config.rto);

        loop {
            if deadline.expired() {
                self.state = ConnectionState::Closed;
                log::warn!("teardown deadline hit in LAST_ACK; closing anyway");
                return Err(ConnError::TeardownTimeout);
            }

            if let Some((pkt, _)) = self.recv(deadline.clip(self.config.poll_interval)).await {
                let acks_fin = pkt.is_ack() && !pkt.is_syn() && pkt.header.ack == fin_seq + 1;
                if !acks_fin || pkt.is_fin() {
                    self.on_packet(pkt, sink).await?;
                }
                if acks_fin {
                    log::debug!("RCV ACK FOR FIN");
                    break;
                }
            }

            let now = Instant::now();
            if timer.is_due(now) {
                log::debug!("TIMEOUT on FIN, RETX FIN SEQ={fin_seq}");
                self.send_control(&fin).await;
                timer.rearm(now);
            }
        }

        self.state = ConnectionState::Closed;
        log::info!("CLOSED");
        Ok(())
    }

    // ─── I/O helpers ────────────────────────────────────────────────────────

    /// Wait up to `wait` for one datagram from the peer (from anyone while
    /// listening).  Loss injection happens here.
    async fn recv(&mut self, wait: Duration) -> Option<(Packet, SocketAddr)> {
        let (pkt, from) = match self.socket.recv_timeout(wait).await {
            Ok(Some(got)) => got,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("receive error: {e}");
                return None;
            }
        };
        if let Some(peer) = self.peer {
            if from != peer {
                log::debug!("ignoring datagram from {from}");
                return None;
            }
        }
        if self.loss.should_drop(&pkt) {
            log::debug!("DROP DATA SEQ={}", pkt.header.seq);
            return None;
        }
        Some((pkt, from))
    }

    /// Send failures are logged and otherwise ignored; retransmission
    /// covers for them.
    async fn send_control(&self, pkt: &Packet) {
        let Some(peer) = self.peer else { return };
        if let Err(e) = self.socket.send_to(pkt, peer).await {
            log::warn!("send to {peer} failed: {e}");
        }
    }

    async fn send_datagram(&self, datagram: &[u8]) {
        let Some(peer) = self.peer else { return };
        if let Err(e) = self.socket.send_raw(datagram, peer).await {
            log::warn!("send to {peer} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isn_stays_below_2_pow_31() {
        assert!((0..1000).map(|_| random_isn()).all(|isn| isn < 0x8000_0000));
    }

    #[tokio::test]
    async fn listen_rejects_bad_config() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let config = ShamConfig {
            window_packets: 0,
            ..ShamConfig::default()
        };
        let err = Connection::listen(socket, config).unwrap_err();
        assert!(matches!(err, ConnError::Config(ConfigError::EmptyWindow)));
    }

    #[tokio::test]
    async fn run_requires_established() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut conn = Connection::listen(socket, ShamConfig::default()).unwrap();
        let mut sink = Vec::<u8>::new();
        let err = conn
            .run(&mut crate::stream::EmptySource, &mut sink, ClosePolicy::AwaitPeer)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnError::BadState(ConnectionState::Listen)));
    }

    #[tokio::test]
    async fn accept_handshake_outside_listen_is_rejected() {
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut conn = Connection::listen(socket, ShamConfig::default()).unwrap();
        conn.state = ConnectionState::Established;
        assert!(matches!(
            conn.accept_handshake().await,
            Err(ConnError::BadState(ConnectionState::Established))
        ));
    }
}
