//! TXT record lookups for region discovery.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use latmesh_core::dns::{self, DnsError, DNS_MAX_UDP_PACKET};
use latmesh_core::LatmeshConfig;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("dns: {0}")]
    Dns(#[from] DnsError),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("no answer from {0} before timeout")]
    Timeout(SocketAddr),
}

/// Source of TXT records. Discovery only ever calls this.
#[async_trait]
pub trait RegionResolver: Send + Sync {
    /// All TXT records for `name`, one string per record.
    /// A name that does not exist yields no records.
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ResolveError>;
}

/// Sends one UDP TXT query to a fixed server.
#[derive(Debug, Clone)]
pub struct DnsTxtResolver {
    server: SocketAddr,
    timeout: Duration,
}

impl DnsTxtResolver {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    pub fn from_config(config: &LatmeshConfig) -> Self {
        Self::new(
            config.discovery.resolver_addr(),
            config.discovery.query_timeout(),
        )
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    async fn query(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        let id: u16 = rand::random();
        let query = dns::encode_txt_query(id, name)?;

        let bind = if self.server.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(self.server).await?;
        socket.send(&query).await?;

        let mut buf = [0u8; DNS_MAX_UDP_PACKET];
        loop {
            let n = socket.recv(&mut buf).await?;
            match dns::decode_txt_response(id, &buf[..n]) {
                // Stray datagram from an earlier query; keep waiting.
                Err(DnsError::IdMismatch { .. }) => continue,
                other => return Ok(other?),
            }
        }
    }
}

#[async_trait]
impl RegionResolver for DnsTxtResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, ResolveError> {
        tokio::time::timeout(self.timeout, self.query(name))
            .await
            .map_err(|_| ResolveError::Timeout(self.server))?
    }
}

/// Split a comma-separated regions record into identifiers.
/// Whitespace around entries is trimmed and empty entries are dropped.
pub fn split_regions(record: &str) -> Vec<String> {
    record
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
