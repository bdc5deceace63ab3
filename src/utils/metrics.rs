//! Observability and Metrics
//!
//! Per-multiplexer counters for sockets, datagrams and errors.
//!
//! Uses atomic counters for thread-safe metrics collection. Every multiplexer owns
//! its own `Metrics`, so independent instances never share counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for one multiplexer
#[derive(Debug)]
pub struct Metrics {
    /// Total sockets bound
    pub sockets_opened: AtomicU64,
    /// Total sockets released
    pub sockets_closed: AtomicU64,
    /// Currently open sockets
    pub sockets_active: AtomicU64,
    /// Total datagrams sent
    pub datagrams_sent: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Total datagrams received
    pub datagrams_received: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Bind failures
    pub bind_errors: AtomicU64,
    /// Send and resolution failures
    pub send_errors: AtomicU64,
    /// Transient receive failures
    pub receive_errors: AtomicU64,
    /// Datagrams that filled the whole receive buffer
    pub truncated_datagrams: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sockets_opened: AtomicU64::new(0),
            sockets_closed: AtomicU64::new(0),
            sockets_active: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bind_errors: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            truncated_datagrams: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a newly bound socket
    pub fn socket_opened(&self) {
        self.sockets_opened.fetch_add(1, Ordering::Relaxed);
        self.sockets_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a released socket
    pub fn socket_closed(&self) {
        self.sockets_closed.fetch_add(1, Ordering::Relaxed);
        self.sockets_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a datagram sent
    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a datagram received
    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn bind_error(&self) {
        self.bind_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn truncated_datagram(&self) {
        self.truncated_datagrams.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot; `events_dropped` comes from the event bus
    pub fn snapshot(&self, events_dropped: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            sockets_opened: self.sockets_opened.load(Ordering::Relaxed),
            sockets_closed: self.sockets_closed.load(Ordering::Relaxed),
            sockets_active: self.sockets_active.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bind_errors: self.bind_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            truncated_datagrams: self.truncated_datagrams.load(Ordering::Relaxed),
            events_dropped,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sockets_opened: u64,
    pub sockets_closed: u64,
    pub sockets_active: u64,
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub bind_errors: u64,
    pub send_errors: u64,
    pub receive_errors: u64,
    pub truncated_datagrams: u64,
    pub events_dropped: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Log this snapshot
    pub fn log(&self) {
        info!(
            sockets_opened = self.sockets_opened,
            sockets_closed = self.sockets_closed,
            sockets_active = self.sockets_active,
            datagrams_sent = self.datagrams_sent,
            bytes_sent = self.bytes_sent,
            datagrams_received = self.datagrams_received,
            bytes_received = self.bytes_received,
            bind_errors = self.bind_errors,
            send_errors = self.send_errors,
            receive_errors = self.receive_errors,
            truncated_datagrams = self.truncated_datagrams,
            events_dropped = self.events_dropped,
            uptime_seconds = self.uptime_seconds,
            "Multiplexer metrics snapshot"
        );
    }
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_counters_balance() {
        let metrics = Metrics::new();
        metrics.socket_opened();
        metrics.socket_opened();
        metrics.socket_closed();
        let snap = metrics.snapshot(0);
        assert_eq!(snap.sockets_opened, 2);
        assert_eq!(snap.sockets_closed, 1);
        assert_eq!(snap.sockets_active, 1);
    }

    #[test]
    fn test_byte_counters() {
        let metrics = Metrics::new();
        metrics.datagram_sent(10);
        metrics.datagram_received(4);
        metrics.datagram_received(6);
        let snap = metrics.snapshot(3);
        assert_eq!(snap.datagrams_sent, 1);
        assert_eq!(snap.bytes_sent, 10);
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.bytes_received, 10);
        assert_eq!(snap.events_dropped, 3);
    }
}
