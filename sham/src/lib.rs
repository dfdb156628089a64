//! `sham`: a reliable, ordered byte stream implemented over UDP.
//!
//! # Architecture
//!
//! ```text
//!   ByteSource                               ByteSink
//!       │ chunks ≤ 1024 B                        ▲ in-order bytes
//!  ┌────▼─────┐   DATA (flags = 0)   ┌──────────┴─┐
//!  │  Sender  │─────────────────────▶│  Receiver  │   (go-back-N)
//!  │ + Ledger │◀─────────────────────│            │
//!  └────┬─────┘   cumulative ACKs    └──────┬─────┘
//!       │                                   │
//!  ┌────▼───────────────────────────────────▼────┐
//!  │                 Connection                   │
//!  │ handshake · transfer loop · teardown · loss  │
//!  └────┬─────────────────────────────────────────┘
//!       │ 12-byte header + payload
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]    : wire format (serialise / deserialise)
//! - [`ledger`]    : bounded map of in-flight packets for retransmission
//! - [`sender`]    : sliding-window outbound state
//! - [`receiver`]  : go-back-N inbound state
//! - [`state`]     : finite-state-machine types
//! - [`connection`]: handshake, transfer loop and teardown
//! - [`simulator`] : inbound data-packet loss injection
//! - [`socket`]    : async UDP socket abstraction
//! - [`stream`]    : byte source / sink collaborators
//! - [`timer`]     : fixed-RTO timers and phase deadlines
//! - [`config`]    : tunable protocol parameters
//! - [`server`], [`client`], [`chat`]: the file-transfer and chat programs

pub mod chat;
pub mod client;
pub mod config;
pub mod connection;
pub mod ledger;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stream;
pub mod timer;
