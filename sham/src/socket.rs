//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Packet`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only datagram I/O.
//!
//! Receiving is always bounded: [`Socket::recv_timeout`] gives up after the
//! supplied interval so the caller's timers keep running.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, MAX_DATAGRAM};

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The packet could not be framed, or a datagram could not be decoded.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

/// An async, packet-oriented UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `packet` and send it as one datagram to `dest`.
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        let bytes = packet.encode()?;
        self.send_raw(&bytes, dest).await
    }

    /// Send an already-encoded datagram (retransmissions reuse the exact
    /// bytes of the first send).
    pub async fn send_raw(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Packet`].
    ///
    /// Anything beyond [`MAX_DATAGRAM`] bytes is truncated by the OS, the
    /// same as a fixed-size receive buffer would.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        let packet = Packet::decode(&buf[..n])?;
        Ok((packet, addr))
    }

    /// [`Socket::recv_from`] bounded by `wait`.  `Ok(None)` means nothing
    /// arrived in time.
    pub async fn recv_timeout(
        &self,
        wait: Duration,
    ) -> Result<Option<(Packet, SocketAddr)>, SocketError> {
        match tokio::time::timeout(wait, self.recv_from()).await {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn packet_crosses_loopback() {
        let a = loopback().await;
        let b = loopback().await;

        let pkt = Packet::data(9, 100, b"over the wire".to_vec());
        a.send_to(&pkt, b.local_addr).await.unwrap();

        let (got, from) = b
            .recv_timeout(Duration::from_secs(2))
            .await
            .unwrap()
            .expect("datagram");
        assert_eq!(got, pkt);
        assert_eq!(from, a.local_addr);
    }

    #[tokio::test]
    async fn recv_timeout_returns_none_when_idle() {
        let s = loopback().await;
        let got = s.recv_timeout(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn short_datagram_surfaces_as_packet_error() {
        let a = loopback().await;
        let b = loopback().await;
        a.send_raw(&[1, 2, 3], b.local_addr).await.unwrap();

        let err = b.recv_timeout(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(
            err,
            SocketError::Packet(PacketError::Malformed { len: 3 })
        ));
    }
}
