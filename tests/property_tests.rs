//! Property-based tests using proptest
//!
//! Datagram records compare and hash by value over every field.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use proptest::prelude::*;
use udp_multiplexer::utils::event_bus::EventBus;
use udp_multiplexer::InboundDatagram;

fn hash_of(datagram: &InboundDatagram) -> u64 {
    let mut hasher = DefaultHasher::new();
    datagram.hash(&mut hasher);
    hasher.finish()
}

fn arb_datagram() -> impl Strategy<Value = InboundDatagram> {
    (
        prop::collection::vec(any::<u8>(), 0..512),
        any::<[u8; 4]>(),
        any::<u16>(),
        any::<u16>(),
    )
        .prop_map(|(payload, ip, source_port, local_port)| {
            let source = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), source_port);
            InboundDatagram::new(payload, source, local_port)
        })
}

// Property: independently built copies are equal and hash identically
proptest! {
    #[test]
    fn prop_equal_content_equal_hash(datagram in arb_datagram()) {
        let copy = InboundDatagram::new(datagram.payload.to_vec(), datagram.source(), datagram.local_port);
        prop_assert_eq!(&copy, &datagram);
        prop_assert_eq!(hash_of(&copy), hash_of(&datagram));
    }
}

// Property: changing any single field breaks equality
proptest! {
    #[test]
    fn prop_any_field_change_breaks_equality(datagram in arb_datagram(), field in 0usize..4) {
        let mut changed = datagram.clone();
        match field {
            0 => {
                let mut bytes = changed.payload.to_vec();
                bytes.push(0);
                changed.payload = bytes.into();
            }
            1 => {
                changed.source_address = match changed.source_address {
                    IpAddr::V4(ip) => IpAddr::V4(Ipv4Addr::from(u32::from(ip).wrapping_add(1))),
                    IpAddr::V6(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                };
            }
            2 => changed.source_port = changed.source_port.wrapping_add(1),
            _ => changed.local_port = changed.local_port.wrapping_add(1),
        }
        prop_assert_ne!(changed, datagram);
    }
}

// Property: a non-reading subscriber keeps exactly the first `capacity` items
proptest! {
    #[test]
    fn prop_bus_keeps_oldest(capacity in 1usize..64, published in 0usize..256) {
        let bus = EventBus::new(capacity);
        let mut sub = bus.subscribe();
        for i in 0..published {
            bus.publish(i);
        }

        let mut kept = Vec::new();
        while let Some(item) = sub.try_recv() {
            kept.push(item);
        }
        let expected: Vec<usize> = (0..published.min(capacity)).collect();
        prop_assert_eq!(kept, expected);
        prop_assert_eq!(bus.dropped() as usize, published.saturating_sub(capacity));
    }
}
