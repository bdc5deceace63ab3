//! # Error Types
//!
//! Error handling for the UDP multiplexer.
//!
//! This module defines every error variant that socket table operations can
//! surface, from bind failures on a fresh local port to resolution and send
//! failures on an already-open socket.
//!
//! ## Error Categories
//! - **Bind Errors**: port in use by another process, permission denied
//! - **Send Errors**: unreachable destination, host resolution failure
//! - **Receive Errors**: transient OS-level failures inside a receive loop
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! Bind and send errors are returned to the caller of `send`. Receive errors never
//! leave the receive loop; they are published as [`SocketEvent::Error`] instead.
//!
//! [`SocketEvent::Error`]: crate::core::event::SocketEvent::Error
//!
//! ## Example Usage
//! ```rust,no_run
//! use udp_multiplexer::error::{MultiplexError, Result};
//! use udp_multiplexer::SocketMultiplexer;
//! use tracing::{info, error};
//!
//! async fn ping(mux: &SocketMultiplexer) -> Result<()> {
//!     match mux.send(&b"ping"[..], 40_000, "127.0.0.1", 40_001).await {
//!         Ok(bytes) => info!(bytes, "Datagram sent"),
//!         Err(MultiplexError::Bind { port, .. }) => error!(port, "Port unavailable"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Socket table errors
    pub const ERR_MULTIPLEXER_CLOSED: &str = "Multiplexer has been shut down";
    pub const ERR_SOCKET_LIMIT: &str = "Socket limit reached";

    /// Bind errors
    pub const ERR_BIND_FAILED: &str = "Failed to bind UDP socket";
    pub const ERR_INVALID_BIND_ADDRESS: &str = "Invalid bind address";

    /// Send errors
    pub const ERR_SEND_FAILED: &str = "Failed to send datagram";
    pub const ERR_RESOLVE_FAILED: &str = "Failed to resolve remote address";
    pub const ERR_NO_ADDRESS: &str = "Remote address resolved to no usable address";
    pub const ERR_OVERSIZED_DATAGRAM: &str = "Datagram exceeds maximum UDP payload";
    pub const ERR_UNASSIGNED_PORT: &str =
        "Cannot send from port 0; open it first and send from the assigned port";

    /// Receive errors
    pub const ERR_RECEIVE_FAILED: &str = "Failed to receive datagram";
    pub const ERR_TRUNCATED: &str = "Datagram may have been truncated by the receive buffer";
    pub const ERR_RETRIES_EXHAUSTED: &str = "Receive retries exhausted, closing socket";
}

/// Coarse classification of an error, carried by error events on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Binding a local port failed
    Bind,
    /// Sending a datagram failed after the socket existed
    Send,
    /// The remote address could not be resolved
    Resolve,
    /// A transient receive failure inside a receive loop
    Receive,
    /// A received datagram filled the whole receive buffer
    Truncated,
    /// Configuration problem
    Config,
    /// Anything else
    Other,
}

// MultiplexError is the primary error type for all multiplexer operations
#[derive(Error, Debug)]
pub enum MultiplexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind UDP socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Failed to send datagram from port {port} to {target}: {source}")]
    Send {
        port: u16,
        target: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to resolve {address}:{port}: {source}")]
    Resolve {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Remote address {address}:{port} resolved to no usable address")]
    NoAddress { address: String, port: u16 },

    #[error("Datagram too large: {0} bytes")]
    OversizedDatagram(usize),

    #[error("{}", constants::ERR_UNASSIGNED_PORT)]
    UnassignedLocalPort,

    #[error("Socket limit reached: {0} sockets open")]
    SocketLimit(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Multiplexer closed")]
    Closed,
}

impl MultiplexError {
    /// Classify this error for event reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultiplexError::Bind { .. } | MultiplexError::InvalidBindAddress(_) => ErrorKind::Bind,
            MultiplexError::Send { .. }
            | MultiplexError::OversizedDatagram(_)
            | MultiplexError::UnassignedLocalPort => ErrorKind::Send,
            MultiplexError::Resolve { .. } | MultiplexError::NoAddress { .. } => {
                ErrorKind::Resolve
            }
            MultiplexError::ConfigError(_) => ErrorKind::Config,
            MultiplexError::Io(_) | MultiplexError::SocketLimit(_) | MultiplexError::Closed => {
                ErrorKind::Other
            }
        }
    }
}

/// Type alias for Results using MultiplexError
pub type Result<T> = std::result::Result<T, MultiplexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_kind_and_message() {
        let err = MultiplexError::Bind {
            port: 5000,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(err.kind(), ErrorKind::Bind);
        assert!(err.to_string().contains("port 5000"));
    }

    #[test]
    fn test_resolve_error_kind() {
        let err = MultiplexError::NoAddress {
            address: "nowhere.invalid".to_string(),
            port: 9,
        };
        assert_eq!(err.kind(), ErrorKind::Resolve);
    }

    #[test]
    fn test_oversized_counts_as_send() {
        assert_eq!(MultiplexError::OversizedDatagram(70_000).kind(), ErrorKind::Send);
    }
}
