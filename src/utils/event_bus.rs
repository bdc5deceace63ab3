//! # Event Bus
//!
//! Multi-producer, multi-subscriber fan-out with a **drop-newest** overflow policy.
//!
//! Every subscriber owns a bounded queue. Publishing never waits: if a subscriber's
//! queue is full the item being published is discarded for that subscriber, and the
//! items already queued are kept. Subscribers that went away are pruned on the next
//! publish. There is no replay, so a late subscriber only sees items published after
//! it subscribed.
//!
//! ## Usage
//! ```rust
//! use udp_multiplexer::utils::event_bus::EventBus;
//!
//! let bus = EventBus::new(2);
//! let mut sub = bus.subscribe();
//! bus.publish(1u32);
//! bus.publish(2);
//! bus.publish(3); // queue full, dropped
//! assert_eq!(sub.try_recv(), Some(1));
//! assert_eq!(sub.try_recv(), Some(2));
//! assert_eq!(sub.try_recv(), None);
//! assert_eq!(bus.dropped(), 1);
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

/// Fan-out publisher shared by every producer
pub struct EventBus<T> {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<T>>>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl<T: Clone> EventBus<T> {
    /// Create a bus whose subscribers each buffer up to `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a new subscriber; it sees only items published from now on
    pub fn subscribe(&self) -> EventStream<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        EventStream {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Deliver `item` to every subscriber with room for it.
    ///
    /// Returns the number of subscribers that received the item.
    pub fn publish(&self, item: T) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|tx| match tx.try_send(item.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Subscriber queue full, dropping newest event");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        delivered
    }

    /// Number of live subscribers (as of the last publish)
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Total items discarded because a subscriber queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
            capacity: self.capacity,
            dropped: self.dropped.clone(),
        }
    }
}

/// Receiving half of one subscription
pub struct EventStream<T> {
    inner: ReceiverStream<T>,
}

impl<T> EventStream<T> {
    /// Wait for the next item; `None` once the bus is gone and the queue is drained
    pub async fn recv(&mut self) -> Option<T> {
        self.inner.next().await
    }

    /// Take a queued item without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
