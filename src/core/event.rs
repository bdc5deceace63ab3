use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::core::datagram::InboundDatagram;
use crate::error::ErrorKind;

/// Why a receive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// `close_socket` was called for this port
    Requested,
    /// `close_all_sockets` was called
    Shutdown,
    /// Consecutive receive failures exceeded the retry limit
    ReceiveFailed,
}

/// An item on the multiplexer's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A socket was bound and its receive loop started
    Opened {
        local_port: u16,
        local_addr: SocketAddr,
    },
    /// A datagram arrived on one of the open sockets
    Received(InboundDatagram),
    /// Something went wrong; the socket (if any) is still usable unless a `Closed` follows
    Error {
        local_port: u16,
        kind: ErrorKind,
        message: String,
    },
    /// A receive loop terminated and its socket was released
    Closed { local_port: u16, reason: CloseReason },
}

impl SocketEvent {
    /// Local port this event concerns
    pub fn local_port(&self) -> u16 {
        match self {
            SocketEvent::Opened { local_port, .. }
            | SocketEvent::Error { local_port, .. }
            | SocketEvent::Closed { local_port, .. } => *local_port,
            SocketEvent::Received(datagram) => datagram.local_port,
        }
    }

    /// The datagram carried by a `Received` event
    pub fn datagram(&self) -> Option<&InboundDatagram> {
        match self {
            SocketEvent::Received(datagram) => Some(datagram),
            _ => None,
        }
    }

    pub fn into_datagram(self) -> Option<InboundDatagram> {
        match self {
            SocketEvent::Received(datagram) => Some(datagram),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SocketEvent::Error { .. })
    }
}

/// Coarse health of a socket session, kept as a latest-value channel.
///
/// Starts at `Init`, moves to `Received` for every datagram and to `Error` for any
/// bind, send or receive failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecycleEvent {
    #[default]
    Init,
    Received(InboundDatagram),
    Error,
}
