use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::net::SocketAddr;
use udp_multiplexer::utils::event_bus::EventBus;
use udp_multiplexer::{InboundDatagram, SocketEvent};

fn sample_event(size: usize) -> SocketEvent {
    let source: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    SocketEvent::Received(InboundDatagram::new(vec![0xAB; size], source, 5000))
}

fn bench_event_bus_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_bus_publish");

    for subscribers in [1usize, 4, 16] {
        group.bench_function(format!("{subscribers}_subscribers"), |b| {
            b.iter_batched(
                || {
                    let bus = EventBus::new(1024);
                    let subs: Vec<_> = (0..subscribers).map(|_| bus.subscribe()).collect();
                    (bus, subs)
                },
                |(bus, _subs)| {
                    for _ in 0..1024 {
                        bus.publish(sample_event(512));
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    // Full queues: every publish takes the drop-newest path
    let bus = EventBus::new(1);
    let _sub = bus.subscribe();
    bus.publish(sample_event(64));
    group.bench_function("overflow_drop", |b| {
        b.iter(|| bus.publish(sample_event(64)))
    });

    group.finish();
}

criterion_group!(benches, bench_event_bus_publish);
criterion_main!(benches);
