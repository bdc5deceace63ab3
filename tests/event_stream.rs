//! Integration tests for the shared event stream
//!
//! Covers the drop-newest overflow policy, fan-out to several subscribers and the
//! absence of replay for late subscribers.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::UdpSocket as StdUdpSocket;
use std::time::{Duration, Instant};

use tokio::time::{sleep, timeout};
use udp_multiplexer::{MultiplexerConfig, SocketEvent, SocketMultiplexer};

fn mux_with_capacity(capacity: usize) -> SocketMultiplexer {
    let config = MultiplexerConfig::default_with_overrides(|c| {
        c.socket.bind_address = "127.0.0.1".to_string();
        c.events.channel_capacity = capacity;
    });
    SocketMultiplexer::new(config).unwrap()
}

/// Wait until `count` events were discarded for full subscribers
async fn wait_for_dropped(mux: &SocketMultiplexer, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while mux.metrics().events_dropped < count {
        assert!(Instant::now() < deadline, "events were never dropped");
        sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the receiver has taken `count` datagrams off its sockets
async fn wait_for_received(mux: &SocketMultiplexer, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while mux.metrics().datagrams_received < count {
        assert!(Instant::now() < deadline, "datagrams never arrived");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial_test::serial]
async fn test_overflow_drops_newest() {
    let receiver = mux_with_capacity(4);
    let port = receiver.open(0).await.unwrap().port();
    let mut idle = receiver.subscribe();

    let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    for i in 0..10u8 {
        sender.send_to(&[i], ("127.0.0.1", port)).unwrap();
    }
    wait_for_received(&receiver, 10).await;
    wait_for_dropped(&receiver, 6).await;

    let mut kept = Vec::new();
    while let Some(event) = idle.try_recv() {
        kept.push(event.into_datagram().unwrap().payload[0]);
    }
    assert_eq!(kept, vec![0, 1, 2, 3]);
    assert_eq!(receiver.metrics().events_dropped, 6);

    // The loop kept running: a drained subscriber sees new traffic again
    sender.send_to(&[42], ("127.0.0.1", port)).unwrap();
    let next = timeout(Duration::from_secs(5), idle.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&next.into_datagram().unwrap().payload[..], &[42]);

    receiver.close_all_sockets().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial_test::serial]
async fn test_every_subscriber_gets_each_datagram() {
    let receiver = mux_with_capacity(64);
    let port = receiver.open(0).await.unwrap().port();
    let mut first = receiver.subscribe();
    let mut second = receiver.subscribe();

    let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"fan-out", ("127.0.0.1", port)).unwrap();

    for events in [&mut first, &mut second] {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&event.into_datagram().unwrap().payload[..], b"fan-out");
    }

    receiver.close_all_sockets().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial_test::serial]
async fn test_late_subscriber_sees_no_history() {
    let receiver = mux_with_capacity(64);
    let port = receiver.open(0).await.unwrap().port();
    let mut early = receiver.subscribe();

    let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"before", ("127.0.0.1", port)).unwrap();
    let first_seen = timeout(Duration::from_secs(5), early.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&first_seen.into_datagram().unwrap().payload[..], b"before");

    let mut late = receiver.subscribe();
    assert!(late.try_recv().is_none());

    sender.send_to(b"after", ("127.0.0.1", port)).unwrap();
    let event = timeout(Duration::from_secs(5), late.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&event.into_datagram().unwrap().payload[..], b"after");

    receiver.close_all_sockets().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_are_tagged_with_receiving_port() {
    let receiver = mux_with_capacity(64);
    let port_a = receiver.open(0).await.unwrap().port();
    let port_b = receiver.open(0).await.unwrap().port();
    let mut events = receiver.subscribe();

    let sender = StdUdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"a", ("127.0.0.1", port_a)).unwrap();
    sender.send_to(b"b", ("127.0.0.1", port_b)).unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let SocketEvent::Received(datagram) = event {
            seen.push((datagram.payload[0], datagram.local_port));
        }
    }
    seen.sort();
    assert_eq!(seen, vec![(b'a', port_a), (b'b', port_b)]);

    receiver.close_all_sockets().await;
}
