//! # UDP Multiplexer
//!
//! Hold many UDP sockets open at once, keyed by local port, send through any of them
//! on demand, and consume everything they receive from one event stream.
//!
//! ## Architecture
//! - **[`transport`]**: the [`SocketMultiplexer`], its socket table and receive loops
//! - **[`core`]**: [`InboundDatagram`], [`SocketEvent`] and [`LifecycleEvent`]
//! - **[`config`]**: TOML/env configuration with validation
//! - **[`error`]**: [`MultiplexError`] and the crate [`Result`]
//! - **[`utils`]**: drop-newest event bus, metrics and logging setup
//!
//! ## Semantics
//! - The first `send` on a local port binds it (with `SO_REUSEADDR`) and starts a
//!   receive loop; later sends reuse the socket.
//! - Receive loops publish onto a bounded stream per subscriber. When a subscriber
//!   falls behind, the newest events are dropped for it; receive loops never wait.
//! - No framing, retransmission or ordering is added on top of UDP.
//!
//! ## Quick Start
//! ```rust,no_run
//! use udp_multiplexer::{MultiplexerConfig, SocketMultiplexer};
//! use futures::StreamExt;
//!
//! # async fn run() -> udp_multiplexer::Result<()> {
//! let mux = SocketMultiplexer::new(MultiplexerConfig::default())?;
//! let mut datagrams = mux.subscribe_datagrams();
//!
//! mux.send(b"hello".to_vec(), 9000, "127.0.0.1", 9001).await?;
//!
//! if let Some(datagram) = datagrams.next().await {
//!     println!("{:?} from {}", datagram.payload, datagram.source());
//! }
//! mux.close_all_sockets().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::config::MultiplexerConfig;
pub use crate::core::{CloseReason, InboundDatagram, LifecycleEvent, SocketEvent};
pub use crate::error::{ErrorKind, MultiplexError, Result};
pub use crate::transport::{Resolver, SocketMultiplexer, SystemResolver};
pub use crate::utils::{EventStream, MetricsSnapshot};
