//! # Socket Multiplexer
//!
//! Holds any number of UDP sockets open at once, keyed by local port, and merges
//! everything they receive into one event stream.
//!
//! ## Locking
//! The socket table is the only shared mutable state. A single async mutex guards
//! every lookup, insert and removal. The lock is held for the table step only:
//! `send` resolves the destination before touching the table, then clones the
//! socket out of its entry and performs the network send after releasing the
//! lock, so a slow destination on one port never stalls another port.
//! Entries are never mutated in place, only inserted or removed whole, which keeps
//! a cloned socket valid for the duration of the send.
//!
//! Creating a socket happens under the lock, so two sends racing on a fresh port
//! produce exactly one bind; the loser reuses the winner's entry.
//!
//! ## Shutdown
//! `close_socket` and `close_all_sockets` remove entries and fire their shutdown
//! signals under the lock, then wait for the receive tasks after releasing it.
//! When they return, no receive task still owns a closed socket.
//!
//! ## Example
//! ```rust,no_run
//! use udp_multiplexer::{SocketEvent, SocketMultiplexer};
//!
//! # async fn run() -> udp_multiplexer::Result<()> {
//! let mux = SocketMultiplexer::with_defaults();
//! let mut events = mux.subscribe();
//!
//! mux.send(&b"hello"[..], 40_000, "127.0.0.1", 40_001).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SocketEvent::Received(datagram) = event {
//!         println!("{} bytes from {}", datagram.len(), datagram.source());
//!     }
//! }
//!
//! mux.close_all_sockets().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{BoxStream, StreamExt};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{MultiplexerConfig, SocketConfig};
use crate::core::datagram::InboundDatagram;
use crate::core::event::{CloseReason, LifecycleEvent, SocketEvent};
use crate::error::{ErrorKind, MultiplexError, Result};
use crate::transport::receiver::{ReceiveLoop, ShutdownSignal};
use crate::transport::udp::{self, Resolver, SystemResolver};
use crate::utils::event_bus::{EventBus, EventStream};
use crate::utils::metrics::{Metrics, MetricsSnapshot, Timer};

/// Local port to open socket
pub(crate) type SocketTable = HashMap<u16, SocketHandle>;

/// One bound socket and the task receiving on it
pub(crate) struct SocketHandle {
    pub(crate) socket: Arc<UdpSocket>,
    pub(crate) local_addr: SocketAddr,
    pub(crate) generation: u64,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) task: JoinHandle<()>,
}

/// State shared between the multiplexer and its receive tasks
pub(crate) struct Shared {
    pub(crate) config: SocketConfig,
    pub(crate) metrics: Metrics,
    pub(crate) bus: EventBus<SocketEvent>,
    lifecycle: watch::Sender<LifecycleEvent>,
    lifecycle_enabled: bool,
    next_generation: AtomicU64,
    root: CancellationToken,
}

impl Shared {
    pub(crate) fn new(config: &MultiplexerConfig) -> Self {
        let (lifecycle, _) = watch::channel(LifecycleEvent::Init);
        Self {
            config: config.socket.clone(),
            metrics: Metrics::new(),
            bus: EventBus::new(config.events.channel_capacity),
            lifecycle,
            lifecycle_enabled: config.events.lifecycle_enabled,
            next_generation: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// Publish onto the event stream without ever waiting on subscribers
    pub(crate) fn publish(&self, event: SocketEvent) {
        if self.lifecycle_enabled {
            match &event {
                SocketEvent::Received(datagram) => {
                    self.lifecycle
                        .send_replace(LifecycleEvent::Received(datagram.clone()));
                }
                SocketEvent::Error { .. } => {
                    self.lifecycle.send_replace(LifecycleEvent::Error);
                }
                _ => {}
            }
        }
        self.bus.publish(event);
    }

    /// Count and publish an error signal
    pub(crate) fn report(&self, local_port: u16, kind: ErrorKind, message: String) {
        match kind {
            ErrorKind::Bind => self.metrics.bind_error(),
            ErrorKind::Send | ErrorKind::Resolve => self.metrics.send_error(),
            ErrorKind::Receive => self.metrics.receive_error(),
            ErrorKind::Truncated => self.metrics.truncated_datagram(),
            ErrorKind::Config | ErrorKind::Other => {}
        }
        self.publish(SocketEvent::Error {
            local_port,
            kind,
            message,
        });
    }

    fn report_error(&self, local_port: u16, err: &MultiplexError) {
        self.report(local_port, err.kind(), err.to_string());
    }
}

struct Inner {
    table: Arc<Mutex<SocketTable>>,
    shared: Arc<Shared>,
    resolver: Arc<dyn Resolver>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Every socket's signal is a child of `root`, so this stops all receive tasks.
        self.shared.root.cancel();
    }
}

/// Multiplexes UDP sockets keyed by local port onto one event stream.
///
/// Cloning is cheap and yields another handle to the same sockets. When the last
/// handle is dropped every receive task is cancelled.
#[derive(Clone)]
pub struct SocketMultiplexer {
    inner: Arc<Inner>,
}

impl SocketMultiplexer {
    /// Create a multiplexer after validating `config`
    pub fn new(config: MultiplexerConfig) -> Result<Self> {
        Self::with_resolver(config, SystemResolver)
    }

    /// Create a multiplexer that resolves remote addresses through `resolver`
    pub fn with_resolver(
        config: MultiplexerConfig,
        resolver: impl Resolver + 'static,
    ) -> Result<Self> {
        config.validate_strict()?;
        Ok(Self::build(&config, Arc::new(resolver)))
    }

    /// Create a multiplexer with the default configuration
    pub fn with_defaults() -> Self {
        Self::build(&MultiplexerConfig::default(), Arc::new(SystemResolver))
    }

    fn build(config: &MultiplexerConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Arc::new(Mutex::new(HashMap::new())),
                shared: Arc::new(Shared::new(config)),
                resolver,
            }),
        }
    }

    /// Send `payload` from `local_port` to `remote_address:remote_port`.
    ///
    /// Opens (and starts receiving on) `local_port` if it is not open yet. Returns
    /// the number of bytes sent. A failed send leaves the socket open.
    ///
    /// `local_port` must be a concrete port. To send from an OS-assigned port, call
    /// [`open(0)`](Self::open) and send from the port it returns.
    #[instrument(skip(self, payload), fields(bytes))]
    pub async fn send(
        &self,
        payload: impl Into<Bytes>,
        local_port: u16,
        remote_address: &str,
        remote_port: u16,
    ) -> Result<usize> {
        let payload = payload.into();
        tracing::Span::current().record("bytes", payload.len());

        let shared = &self.inner.shared;
        if local_port == 0 {
            return Err(MultiplexError::UnassignedLocalPort);
        }
        if payload.len() > shared.config.max_datagram_size {
            return Err(MultiplexError::OversizedDatagram(payload.len()));
        }

        let resolved = match shared.config.bind_ip() {
            Ok(local_ip) => {
                self.inner
                    .resolver
                    .resolve(remote_address, remote_port, local_ip)
                    .await
            }
            Err(e) => Err(e),
        };
        let target = match resolved {
            Ok(target) => target,
            Err(e) => {
                warn!(error = %e, "Remote address resolution failed");
                shared.report_error(local_port, &e);
                return Err(e);
            }
        };

        let (socket, local_addr) = self.acquire(local_port).await?;
        let port = local_addr.port();

        match socket.send_to(&payload, target).await {
            Ok(sent) => {
                shared.metrics.datagram_sent(sent as u64);
                debug!(%target, sent, "Datagram sent");
                Ok(sent)
            }
            Err(source) => {
                let e = MultiplexError::Send {
                    port,
                    target,
                    source,
                };
                warn!(error = %e, "Send failed");
                shared.report_error(port, &e);
                Err(e)
            }
        }
    }

    /// Fire-and-forget variant of [`send`](Self::send).
    ///
    /// Failures are visible on the event stream and in the logs; the returned handle
    /// may be awaited or ignored. Must be called from within a tokio runtime.
    pub fn send_detached(
        &self,
        payload: impl Into<Bytes>,
        local_port: u16,
        remote_address: impl Into<String>,
        remote_port: u16,
    ) -> JoinHandle<Result<usize>> {
        let this = self.clone();
        let payload = payload.into();
        let remote_address = remote_address.into();
        tokio::spawn(async move {
            this.send(payload, local_port, &remote_address, remote_port)
                .await
        })
    }

    /// Bind `local_port` and start receiving without sending anything.
    ///
    /// Idempotent; returns the bound address. Port 0 binds an OS-assigned port,
    /// which is the port the socket is tracked under.
    #[instrument(skip(self))]
    pub async fn open(&self, local_port: u16) -> Result<SocketAddr> {
        self.acquire(local_port).await.map(|(_, addr)| addr)
    }

    /// Close one socket. Returns `false` if the port was not open.
    #[instrument(skip(self))]
    pub async fn close_socket(&self, local_port: u16) -> bool {
        let handle = {
            let mut table = self.inner.table.lock().await;
            let handle = table.remove(&local_port);
            if let Some(handle) = &handle {
                handle.shutdown.trigger(CloseReason::Requested);
            }
            handle
        };

        match handle {
            Some(handle) => {
                finish(handle).await;
                true
            }
            None => {
                debug!("Port not open, nothing to close");
                false
            }
        }
    }

    /// Close every socket. Returns how many were closed.
    #[instrument(skip(self))]
    pub async fn close_all_sockets(&self) -> usize {
        let _timer = Timer::start("close_all_sockets");
        let handles: Vec<SocketHandle> = {
            let mut table = self.inner.table.lock().await;
            table
                .drain()
                .map(|(_, handle)| {
                    handle.shutdown.trigger(CloseReason::Shutdown);
                    handle
                })
                .collect()
        };

        let count = handles.len();
        join_all(handles.into_iter().map(finish)).await;
        info!(count, "All sockets closed");
        self.metrics().log();
        count
    }

    /// Subscribe to every event; only events published from now on are delivered
    pub fn subscribe(&self) -> EventStream<SocketEvent> {
        self.inner.shared.bus.subscribe()
    }

    /// Subscribe to received datagrams only
    pub fn subscribe_datagrams(&self) -> BoxStream<'static, InboundDatagram> {
        self.subscribe()
            .filter_map(|event| async move { event.into_datagram() })
            .boxed()
    }

    /// Latest-value view of session health
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleEvent> {
        self.inner.shared.lifecycle.subscribe()
    }

    /// Currently open local ports, ascending
    pub async fn open_ports(&self) -> Vec<u16> {
        let table = self.inner.table.lock().await;
        let mut ports: Vec<u16> = table.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub async fn is_open(&self, local_port: u16) -> bool {
        self.inner.table.lock().await.contains_key(&local_port)
    }

    pub async fn socket_count(&self) -> usize {
        self.inner.table.lock().await.len()
    }

    /// Bound address of an open port
    pub async fn local_addr(&self, local_port: u16) -> Option<SocketAddr> {
        self.inner
            .table
            .lock()
            .await
            .get(&local_port)
            .map(|handle| handle.local_addr)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let shared = &self.inner.shared;
        shared.metrics.snapshot(shared.bus.dropped())
    }

    /// Look up `local_port`, creating the socket and its receive loop if absent.
    ///
    /// Port 0 always binds a new OS-assigned port.
    async fn acquire(&self, local_port: u16) -> Result<(Arc<UdpSocket>, SocketAddr)> {
        let shared = &self.inner.shared;
        let mut table = self.inner.table.lock().await;

        if local_port != 0 {
            if let Some(handle) = table.get(&local_port) {
                return Ok((handle.socket.clone(), handle.local_addr));
            }
        }

        if table.len() >= shared.config.max_sockets {
            let e = MultiplexError::SocketLimit(table.len());
            warn!(local_port, error = %e, "Refusing to open socket");
            shared.report_error(local_port, &e);
            return Err(e);
        }

        let bound = shared.config.bind_ip().and_then(|ip| {
            udp::bind_socket(ip, local_port, shared.config.reuse_address)
                .and_then(|socket| socket.local_addr().map(|addr| (socket, addr)))
                .map_err(|source| MultiplexError::Bind {
                    port: local_port,
                    source,
                })
        });

        let (socket, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                error!(local_port, error = %e, "Failed to open socket");
                shared.report_error(local_port, &e);
                return Err(e);
            }
        };

        let port = local_addr.port();
        let socket = Arc::new(socket);
        let generation = shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let shutdown = ShutdownSignal::child_of(&shared.root);

        shared.metrics.socket_opened();
        shared.publish(SocketEvent::Opened {
            local_port: port,
            local_addr,
        });

        let task = ReceiveLoop {
            socket: socket.clone(),
            local_port: port,
            generation,
            shutdown: shutdown.clone(),
            shared: shared.clone(),
            table: Arc::downgrade(&self.inner.table),
        }
        .spawn();

        table.insert(
            port,
            SocketHandle {
                socket: socket.clone(),
                local_addr,
                generation,
                shutdown,
                task,
            },
        );
        info!(local_port = port, %local_addr, "Socket opened");

        Ok((socket, local_addr))
    }
}

impl std::fmt::Debug for SocketMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketMultiplexer")
            .field("config", &self.inner.shared.config)
            .field("subscribers", &self.inner.shared.bus.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// Release the table's socket reference and wait for the receive task to exit
async fn finish(handle: SocketHandle) {
    let SocketHandle {
        socket,
        local_addr,
        task,
        ..
    } = handle;
    drop(socket);

    if let Err(e) = task.await {
        if e.is_panic() {
            error!(%local_addr, "Receive task panicked");
        }
    }
}
