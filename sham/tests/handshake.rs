//! Integration tests for the three-way handshake.
//!
//! Each test binds real `tokio::net::UdpSocket`s on loopback, runs the
//! responder in a background task, and checks the states and sequence
//! numbers both sides end up with.  Where one side must misbehave it is a
//! bare [`Socket`] driven by hand.

use std::net::SocketAddr;
use std::time::Duration;

use sham::{
    config::ShamConfig,
    connection::{ConnError, Connection},
    packet::Packet,
    socket::Socket,
    state::{ConnectionState, Role},
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn loopback() -> (Socket, SocketAddr) {
    let socket = Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback socket");
    let addr = socket.local_addr;
    (socket, addr)
}

fn short_deadlines() -> ShamConfig {
    ShamConfig {
        handshake_timeout: Duration::from_millis(300),
        rto: Duration::from_millis(100),
        ..ShamConfig::default()
    }
}

async fn recv_packet(socket: &Socket) -> (Packet, SocketAddr) {
    socket
        .recv_timeout(Duration::from_secs(5))
        .await
        .expect("recv")
        .expect("datagram before timeout")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_both_sides_reach_established() {
    let (server_socket, server_addr) = loopback().await;
    let server_task =
        tokio::spawn(async move { Connection::accept(server_socket, ShamConfig::default()).await });

    let (client_socket, client_addr) = loopback().await;
    let client = tokio::time::timeout(
        Duration::from_secs(5),
        Connection::connect(client_socket, server_addr, ShamConfig::default()),
    )
    .await
    .expect("client connect timed out")
    .expect("client connect failed");

    let server = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server accept timed out")
        .expect("server task panicked")
        .expect("server accept failed");

    assert_eq!(client.state, ConnectionState::Established);
    assert_eq!(server.state, ConnectionState::Established);
    assert_eq!(client.role, Role::Initiator);
    assert_eq!(server.role, Role::Responder);
    assert_eq!(server.peer_addr(), Some(client_addr));
}

#[tokio::test]
async fn handshake_sequence_numbers_agree() {
    let (server_socket, server_addr) = loopback().await;
    let server_task =
        tokio::spawn(async move { Connection::accept(server_socket, ShamConfig::default()).await });

    let (client_socket, _) = loopback().await;
    let client = Connection::connect(client_socket, server_addr, ShamConfig::default())
        .await
        .unwrap();
    let server = server_task.await.unwrap().unwrap();

    assert_eq!(server.peer_isn, client.local_isn);
    assert_eq!(client.peer_isn, server.local_isn);
    assert_eq!(client.sender.send_next, client.local_isn + 1);
    assert_eq!(server.receiver.recv_expected, client.sender.send_next);
    assert_eq!(client.receiver.recv_expected, server.sender.send_next);
    assert!(client.local_isn < 0x8000_0000);
    assert!(server.local_isn < 0x8000_0000);
}

#[tokio::test]
async fn connect_to_silent_peer_times_out() {
    // Bound but never answers.
    let (_silent, silent_addr) = loopback().await;
    let (client_socket, _) = loopback().await;

    let started = tokio::time::Instant::now();
    let err = Connection::connect(client_socket, silent_addr, short_deadlines())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnError::HandshakeTimeout), "got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn syn_is_sent_once_and_wrong_ack_is_ignored() {
    let (peer, peer_addr) = loopback().await;
    let (client_socket, _) = loopback().await;
    let client =
        tokio::spawn(async move { Connection::connect(client_socket, peer_addr, short_deadlines()).await });

    let (syn, client_addr) = recv_packet(&peer).await;
    assert!(syn.is_syn() && !syn.is_ack());
    assert!(syn.payload.is_empty());

    // Acknowledges the wrong ISN; the initiator must not accept it.
    let bogus = Packet::syn_ack(777, syn.header.seq.wrapping_add(2), 65535);
    peer.send_to(&bogus, client_addr).await.unwrap();

    // Nothing else (in particular no second SYN) arrives before the deadline.
    let extra = peer.recv_timeout(Duration::from_millis(250)).await.unwrap();
    assert!(extra.is_none(), "unexpected {extra:?}");

    let err = client.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnError::HandshakeTimeout));
}

#[tokio::test]
async fn responder_returns_to_listen_without_final_ack() {
    let (server_socket, server_addr) = loopback().await;
    let mut server = Connection::listen(server_socket, short_deadlines()).unwrap();
    assert_eq!(server.state, ConnectionState::Listen);

    let (peer, _) = loopback().await;
    peer.send_to(&Packet::syn(1000, 65535), server_addr).await.unwrap();

    let err = server.accept_handshake().await.unwrap_err();
    assert!(matches!(err, ConnError::HandshakeTimeout));
    assert_eq!(server.state, ConnectionState::Listen);
    assert_eq!(server.peer_addr(), None);

    // The SYN+ACK was retransmitted while waiting.
    let mut syn_acks = 0;
    while let Some((pkt, _)) = peer.recv_timeout(Duration::from_millis(50)).await.unwrap() {
        assert!(pkt.is_syn_ack());
        assert_eq!(pkt.header.ack, 1001);
        syn_acks += 1;
    }
    assert!(syn_acks >= 2, "only {syn_acks} SYN+ACK(s)");
}

#[tokio::test]
async fn responder_completes_after_retransmitted_syn_ack() {
    let (server_socket, server_addr) = loopback().await;
    let server_task =
        tokio::spawn(async move { Connection::accept(server_socket, ShamConfig::default()).await });

    let (peer, _) = loopback().await;
    peer.send_to(&Packet::syn(5000, 65535), server_addr).await.unwrap();

    // Ignore the first SYN+ACK as if our ACK had been lost, answer the retry.
    let (first, _) = recv_packet(&peer).await;
    let (second, _) = recv_packet(&peer).await;
    assert!(first.is_syn_ack() && second.is_syn_ack());
    assert_eq!(first.header.seq, second.header.seq);

    let server_isn = second.header.seq;
    peer.send_to(&Packet::ack(5001, server_isn + 1, 65535), server_addr)
        .await
        .unwrap();

    let server = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(server.state, ConnectionState::Established);
    assert_eq!(server.receiver.recv_expected, 5001);
    assert_eq!(server.sender.send_next, server_isn + 1);
}

#[tokio::test]
async fn simultaneous_open_establishes_both() {
    let (a_socket, a_addr) = loopback().await;
    let (b_socket, b_addr) = loopback().await;

    let (a, b) = tokio::join!(
        Connection::connect(a_socket, b_addr, ShamConfig::default()),
        Connection::connect(b_socket, a_addr, ShamConfig::default()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.state, ConnectionState::Established);
    assert_eq!(b.state, ConnectionState::Established);
    assert_eq!(a.peer_isn, b.local_isn);
    assert_eq!(b.peer_isn, a.local_isn);
}
