//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::connection::Connection`] can
//! occupy.  Transitions are driven in [`crate::connection`], only by packet
//! arrival or timer expiry.
//!
//! ```text
//!                 ┌────────┐  SYN sent   ┌──────────┐
//!                 │ CLOSED │────────────▶│ SYN_SENT │──SYN+ACK, ACK sent──┐
//!                 └────────┘             └────┬─────┘                     │
//!                     │ listen          SYN   │ (simultaneous open)       │
//!                     ▼                       ▼                           ▼
//!                 ┌────────┐  SYN   ┌──────────────┐   ACK   ┌─────────────┐
//!                 │ LISTEN │───────▶│ SYN_RECEIVED │────────▶│ ESTABLISHED │
//!                 └────────┘◀───────└──────────────┘         └──────┬──────┘
//!                           deadline                 close / FIN    │ peer FIN
//!                                        ┌───────────────────────────┴───┐
//!                                        ▼                               ▼
//!                                  ┌──────────┐ peer FIN ┌─────────┐  ┌────────────┐
//!                                  │ FIN_WAIT │─────────▶│ CLOSING │  │ CLOSE_WAIT │
//!                                  └────┬─────┘          └────┬────┘  └─────┬──────┘
//!                       ACK + peer FIN  │        ACK of FIN   │             │ FIN sent
//!                                       ▼                     │             ▼
//!                                 ┌───────────┐◀──────────────┘       ┌──────────┐
//!                                 │ TIME_WAIT │                       │ LAST_ACK │
//!                                 └─────┬─────┘                       └────┬─────┘
//!                                       │ linger           ACK of FIN      │
//!                                       ▼                                  ▼
//!                                    CLOSED                             CLOSED
//! ```

use std::fmt;

/// All states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// Responder waiting for a SYN.
    Listen,
    /// SYN sent; waiting for SYN+ACK.
    SynSent,
    /// SYN+ACK sent; waiting for the final handshake ACK.
    SynReceived,
    /// Handshake complete; data flows both ways.
    Established,
    /// Local FIN sent; waiting for its ACK and the peer's FIN.
    FinWait,
    /// Both sides sent FIN before either was acknowledged.
    Closing,
    /// Both FINs seen and acknowledged; lingering for stray retransmissions.
    TimeWait,
    /// Peer FIN received and acknowledged; local FIN still owed.
    CloseWait,
    /// Local FIN sent after the peer's; waiting for its ACK.
    LastAck,
}

impl ConnectionState {
    /// States in which new application data may be transmitted.
    pub fn can_send_data(self) -> bool {
        matches!(self, Self::Established | Self::CloseWait)
    }

    /// States that belong to the close sequence.
    pub fn is_closing(self) -> bool {
        matches!(
            self,
            Self::FinWait | Self::Closing | Self::TimeWait | Self::CloseWait | Self::LastAck
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait => "FIN_WAIT",
            Self::Closing => "CLOSING",
            Self::TimeWait => "TIME_WAIT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
        };
        f.write_str(name)
    }
}

/// Which side of the handshake an endpoint played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent the first SYN.
    Initiator,
    /// Answered a SYN from `LISTEN`.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Responder => f.write_str("responder"),
        }
    }
}
