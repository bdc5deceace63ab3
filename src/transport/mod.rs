//! # Transport Layer
//!
//! UDP socket ownership: binding, sending, and the per-socket receive loops.
//!
//! ## Components
//! - **Multiplexer**: socket table keyed by local port plus the public API
//! - **Receiver**: one receive task per open socket
//! - **UDP helpers**: socket creation with `SO_REUSEADDR` and the pluggable [`Resolver`]

pub mod multiplexer;
pub(crate) mod receiver;
pub(crate) mod udp;

pub use multiplexer::SocketMultiplexer;
pub use udp::{Resolver, SystemResolver};
