//! latmesh integration test harness.
//!
//! Everything runs over loopback inside the test process: real TCP ping
//! exchanges, a fake UDP DNS server, and the HTTP surface on an ephemeral
//! port. No external network or privileges are needed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use latmesh_core::dns;
use latmesh_core::{LatmeshConfig, RttError, RttProbe};
use latmesh_services::{Pinger, RegionRegistry};

mod api;
mod discovery;
mod protocol;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const LOCAL: &str = "iad";
pub const APP: &str = "probe";

/// Config for the local region with short timeouts.
pub fn test_config() -> LatmeshConfig {
    let mut config = LatmeshConfig::default();
    config.identity.region = LOCAL.into();
    config.identity.app_name = APP.into();
    config.network.connect_timeout_ms = 1_000;
    config.network.io_timeout_ms = 1_000;
    config.listener.grace_ms = 10;
    config
}

/// Reports a constant RTT so assertions can use exact values.
pub struct FixedRtt(pub u32);

impl RttProbe for FixedRtt {
    fn smoothed_rtt(&self, _stream: &TcpStream) -> std::result::Result<u32, RttError> {
        Ok(self.0)
    }
}

pub fn pinger(region: &str, probe: Arc<dyn RttProbe>) -> Pinger {
    Pinger::new(
        region,
        probe,
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
}

/// Answer pings as `region` on an ephemeral loopback port.
pub async fn spawn_ping_server(region: &str, probe: Arc<dyn RttProbe>) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = pinger(region, probe);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let server = server.clone();
            tokio::spawn(async move {
                let _ = server.answer(stream, Duration::from_millis(10)).await;
            });
        }
    });
    Ok(addr)
}

/// Registry for the local region whose peers dial the given loopback
/// addresses instead of `<region>.<app>.internal`.
pub fn loopback_registry(addrs: &[(&str, SocketAddr)]) -> RegionRegistry {
    let map: std::collections::HashMap<String, String> = addrs
        .iter()
        .map(|(region, addr)| (region.to_string(), addr.to_string()))
        .collect();
    RegionRegistry::with_address_fn(
        LOCAL,
        Arc::new(move |region: &str| map.get(region).cloned().unwrap_or_default()),
    )
}

/// Minimal HTTP/1.1 GET. Returns (status code, body).
pub async fn http_get(addr: SocketAddr, path: &str) -> Result<(u16, String)> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await?;

    let (head, body) = raw
        .split_once("\r\n\r\n")
        .context("response has no header terminator")?;
    let status = head
        .split_whitespace()
        .nth(1)
        .context("missing status code")?
        .parse()?;
    if head.to_ascii_lowercase().contains("transfer-encoding: chunked") {
        return Ok((status, dechunk(body)?));
    }
    Ok((status, body.to_string()))
}

fn dechunk(mut body: &str) -> Result<String> {
    let mut out = String::new();
    loop {
        let (size, rest) = body.split_once("\r\n").context("bad chunk header")?;
        let size = usize::from_str_radix(size.trim(), 16)?;
        if size == 0 {
            return Ok(out);
        }
        if rest.len() < size + 2 {
            bail!("chunk shorter than declared");
        }
        out.push_str(&rest[..size]);
        body = &rest[size + 2..];
    }
}

/// What the fake DNS server answers with.
#[derive(Clone)]
pub enum DnsAnswer {
    Txt(Vec<String>),
    NxDomain,
}

/// UDP DNS server on loopback answering every TXT query the same way.
pub async fn spawn_dns_server(answer: DnsAnswer) -> Result<SocketAddr> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let addr = socket.local_addr()?;
    tokio::spawn(async move {
        let mut buf = [0u8; dns::DNS_MAX_UDP_PACKET];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            let id = u16::from_be_bytes([buf[0], buf[1]]);
            let reply = match &answer {
                DnsAnswer::Txt(records) => {
                    let records: Vec<Vec<String>> =
                        records.iter().map(|r| vec![r.clone()]).collect();
                    let name = format!("regions.{APP}.internal");
                    match dns::encode_txt_response(id, &name, &records, 5) {
                        Ok(reply) => reply,
                        Err(_) => continue,
                    }
                }
                DnsAnswer::NxDomain => {
                    // Echo the question back as a response with rcode 3.
                    let mut reply = buf[..n].to_vec();
                    reply[2] = 0x81;
                    reply[3] = 0x83;
                    reply
                }
            };
            let _ = socket.send_to(&reply, from).await;
        }
    });
    Ok(addr)
}
