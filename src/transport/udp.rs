//! Socket creation and remote address resolution.
//!
//! Sockets are created through `socket2` so that `SO_REUSEADDR` can be applied
//! before the bind, then handed to tokio as non-blocking sockets.

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, UdpSocket};
use tracing::trace;

use crate::error::{MultiplexError, Result};

/// Turns a remote host name or literal IP into the address a datagram is sent to.
///
/// Resolution runs before the local socket is looked up, so a slow resolver never
/// holds a socket open or blocks sends on other ports.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `address:port` for a socket bound to `local`
    async fn resolve(&self, address: &str, port: u16, local: IpAddr) -> Result<SocketAddr>;
}

/// The system resolver: literal IPs directly, host names through `getaddrinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, address: &str, port: u16, local: IpAddr) -> Result<SocketAddr> {
        lookup(address, port, local).await
    }
}

/// Bind a non-blocking UDP socket to `ip:port`.
///
/// Must be called from within a tokio runtime.
pub(crate) fn bind_socket(ip: IpAddr, port: u16, reuse_address: bool) -> io::Result<UdpSocket> {
    let addr = SocketAddr::new(ip, port);
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if reuse_address {
        socket.set_reuse_address(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    trace!(%addr, reuse_address, "UDP socket bound");
    UdpSocket::from_std(socket.into())
}

/// Resolve `address:port` to a single target.
///
/// Literal IPs skip the resolver. For host names, an address of the same family as
/// the local socket is preferred so the send can actually leave that socket.
async fn lookup(address: &str, port: u16, local: IpAddr) -> Result<SocketAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let candidates: Vec<SocketAddr> = lookup_host((address, port))
        .await
        .map_err(|source| MultiplexError::Resolve {
            address: address.to_string(),
            port,
            source,
        })?
        .collect();

    candidates
        .iter()
        .find(|candidate| candidate.is_ipv4() == local.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| MultiplexError::NoAddress {
            address: address.to_string(),
            port,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_resolve_literal_ip() {
        let target = SystemResolver
            .resolve("127.0.0.1", 9000, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .await
            .unwrap();
        assert_eq!(target, "127.0.0.1:9000".parse().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_localhost_prefers_local_family() {
        let target = SystemResolver
            .resolve("localhost", 9000, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .await
            .unwrap();
        assert_eq!(target.port(), 9000);
        assert!(target.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_without_reuse_conflicts() {
        let first = bind_socket(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, false).unwrap();
        let port = first.local_addr().unwrap().port();
        let second = bind_socket(IpAddr::V4(Ipv4Addr::LOCALHOST), port, false);
        assert!(second.is_err());
    }
}
