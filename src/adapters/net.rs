//! System Network Adapters
//!
//! Resolver and dialer backed by the tokio networking stack.

use std::net::{IpAddr, UdpSocket};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::ports::{Dialer, Resolver};
use crate::error::{Error, Result};

/// Resolves hostnames through the system resolver (`getaddrinfo`).
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| Error::probe(host, e))?;

        let ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        if ips.is_empty() {
            return Err(Error::probe(host, "no addresses returned"));
        }

        Ok(ips)
    }
}

/// Opens and immediately closes plain TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer;

impl TcpDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str) -> Result<()> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| Error::probe(address, e))?;

        if let Ok(peer) = stream.peer_addr() {
            debug!(address = %address, peer = %peer, "Dial succeeded");
        }

        Ok(())
    }
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends no packets; it only makes the kernel pick a
/// route and source address.
pub fn local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_resolver_localhost() {
        let ips = SystemResolver::new().lookup("localhost").await.unwrap();
        assert!(ips.iter().any(|ip| ip.is_loopback()));
    }

    #[tokio::test]
    async fn test_resolver_ip_literal() {
        let ips = SystemResolver::new().lookup("127.0.0.1").await.unwrap();
        assert_eq!(ips, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_dialer_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        TcpDialer::new().dial(&address).await.unwrap();
    }

    #[tokio::test]
    async fn test_dialer_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert_matches!(
            TcpDialer::new().dial(&address).await,
            Err(Error::Probe { .. })
        );
    }
}
