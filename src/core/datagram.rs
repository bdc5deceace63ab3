use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};

/// A datagram received on one of the multiplexer's sockets.
///
/// The payload holds exactly the bytes the socket received, never the padding of
/// the receive buffer. Equality and hashing cover every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InboundDatagram {
    /// Received bytes
    pub payload: Bytes,
    /// Address of the sender
    pub source_address: IpAddr,
    /// Port of the sender
    pub source_port: u16,
    /// Local port of the socket that received the datagram
    pub local_port: u16,
}

impl InboundDatagram {
    pub fn new(payload: impl Into<Bytes>, source: SocketAddr, local_port: u16) -> Self {
        Self {
            payload: payload.into(),
            source_address: source.ip(),
            source_port: source.port(),
            local_port,
        }
    }

    /// Sender as a socket address
    pub fn source(&self) -> SocketAddr {
        SocketAddr::new(self.source_address, self.source_port)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(d: &InboundDatagram) -> u64 {
        let mut hasher = DefaultHasher::new();
        d.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_content_is_equal() {
        let src: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let a = InboundDatagram::new(vec![1, 2, 3], src, 5000);
        let b = InboundDatagram::new(Bytes::copy_from_slice(&[1, 2, 3]), src, 5000);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_each_field_breaks_equality() {
        let src: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let base = InboundDatagram::new(vec![1, 2, 3], src, 5000);

        let mut other = base.clone();
        other.payload = Bytes::from_static(&[1, 2, 4]);
        assert_ne!(base, other);

        let mut other = base.clone();
        other.source_address = "10.0.0.1".parse().unwrap();
        assert_ne!(base, other);

        let mut other = base.clone();
        other.source_port = 4001;
        assert_ne!(base, other);

        let mut other = base.clone();
        other.local_port = 5001;
        assert_ne!(base, other);
    }

    #[test]
    fn test_source_reassembles_socket_addr() {
        let src: SocketAddr = "[::1]:9000".parse().unwrap();
        let d = InboundDatagram::new(Vec::new(), src, 1);
        assert_eq!(d.source(), src);
        assert!(d.is_empty());
    }
}
