//! # Core Types
//!
//! The records that flow out of the multiplexer onto its event stream.
//!
//! ## Components
//! - **InboundDatagram**: one received datagram, tagged with the sender and the local
//!   port that received it
//! - **SocketEvent**: the stream item (socket opened, datagram received, error, socket closed)
//! - **LifecycleEvent**: coarse latest-value health of a socket session
//!
//! Datagrams compare and hash by value: two datagrams are equal when their payload
//! bytes, sender address, sender port and local port are all equal.

pub mod datagram;
pub mod event;

pub use datagram::InboundDatagram;
pub use event::{CloseReason, LifecycleEvent, SocketEvent};
