//! Per-socket receive loop.
//!
//! One task per open socket waits on `recv_from`, copies exactly the received bytes
//! into an [`InboundDatagram`] and publishes it. The wait is readiness based, so a
//! socket with no traffic parks its task without holding a worker thread.
//!
//! The loop ends when its [`ShutdownSignal`] fires or when consecutive receive
//! failures exceed the configured limit. Either way it releases the socket and
//! publishes [`SocketEvent::Closed`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::MAX_UDP_PAYLOAD;
use crate::core::datagram::InboundDatagram;
use crate::core::event::{CloseReason, SocketEvent};
use crate::error::{constants, ErrorKind};
use crate::transport::multiplexer::{Shared, SocketTable};

/// Cancellation plus the reason it was requested.
///
/// A signal that fires without an explicit reason (the owning multiplexer was
/// dropped) reports [`CloseReason::Shutdown`].
#[derive(Clone)]
pub(crate) struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CloseReason>>,
}

impl ShutdownSignal {
    pub(crate) fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Request shutdown; the first reason given wins
    pub(crate) fn trigger(&self, reason: CloseReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    async fn fired(&self) {
        self.token.cancelled().await
    }

    fn reason(&self) -> CloseReason {
        self.reason.get().copied().unwrap_or(CloseReason::Shutdown)
    }
}

/// Where a receive loop reads datagrams from
pub(crate) trait DatagramSource: Send + Sync + 'static {
    fn recv_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;
}

impl DatagramSource for UdpSocket {
    fn recv_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        UdpSocket::recv_from(self, buf)
    }
}

pub(crate) struct ReceiveLoop<S = UdpSocket> {
    pub(crate) socket: Arc<S>,
    pub(crate) local_port: u16,
    pub(crate) generation: u64,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) shared: Arc<Shared>,
    pub(crate) table: Weak<Mutex<SocketTable>>,
}

impl<S: DatagramSource> ReceiveLoop<S> {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        let span = info_span!("receive_loop", local_port = self.local_port);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(self) {
        let ReceiveLoop {
            socket,
            local_port,
            generation,
            shutdown,
            shared,
            table,
        } = self;

        let buffer_size = shared.config.recv_buffer_size;
        let max_retries = shared.config.max_receive_retries;
        let backoff = shared.config.receive_retry_backoff;
        let mut buffer = vec![0u8; buffer_size];
        let mut failures: u32 = 0;

        debug!(buffer_size, "Receive loop started");

        let reason = loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.fired() => break shutdown.reason(),
                result = socket.recv_from(&mut buffer) => result,
            };

            match result {
                Ok((len, source)) => {
                    failures = 0;
                    deliver(&shared, local_port, &buffer[..len], source, buffer_size);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(error = %e, failures, "Receive failed");
                    shared.report(
                        local_port,
                        ErrorKind::Receive,
                        format!("{}: {e}", constants::ERR_RECEIVE_FAILED),
                    );

                    if max_retries > 0 && failures >= max_retries {
                        warn!(failures, "{}", constants::ERR_RETRIES_EXHAUSTED);
                        remove_entry(&table, local_port, generation).await;
                        break CloseReason::ReceiveFailed;
                    }

                    tokio::select! {
                        biased;
                        _ = shutdown.fired() => break shutdown.reason(),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        drop(socket);
        shared.metrics.socket_closed();
        info!(?reason, "Socket closed");
        shared.publish(SocketEvent::Closed { local_port, reason });
    }
}

fn deliver(shared: &Shared, local_port: u16, data: &[u8], source: SocketAddr, buffer_size: usize) {
    let len = data.len();
    shared.metrics.datagram_received(len as u64);
    debug!(bytes = len, %source, "Datagram received");

    // A full buffer is indistinguishable from an exact fit, so it is only reported.
    let maybe_truncated = len == buffer_size && buffer_size < MAX_UDP_PAYLOAD;

    shared.publish(SocketEvent::Received(InboundDatagram::new(
        Bytes::copy_from_slice(data),
        source,
        local_port,
    )));

    if maybe_truncated {
        warn!(bytes = len, %source, "{}", constants::ERR_TRUNCATED);
        shared.report(
            local_port,
            ErrorKind::Truncated,
            format!("{} ({len} bytes from {source})", constants::ERR_TRUNCATED),
        );
    }
}

/// Drop this loop's table entry, unless the port has since been reopened
async fn remove_entry(table: &Weak<Mutex<SocketTable>>, local_port: u16, generation: u64) {
    let Some(table) = table.upgrade() else {
        return;
    };
    let mut table = table.lock().await;
    if table
        .get(&local_port)
        .is_some_and(|handle| handle.generation == generation)
    {
        table.remove(&local_port);
    }
}
