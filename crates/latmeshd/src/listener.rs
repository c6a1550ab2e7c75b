//! Ping listener: the server side of the exchange.
//!
//! Accepts inbound pings, answers each on its own task, and logs the RTT
//! the kernel reports for it. Admission is bounded twice: a token bucket
//! caps the accept rate and a semaphore caps connections in flight.
//! Rejected connections are closed without a reply.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};

use latmesh_core::LatmeshConfig;
use latmesh_services::{Pinger, Role, TokenBucket};

const LISTEN_BACKLOG: i32 = 1024;

/// Bind the ping listener with SO_REUSEADDR. An unspecified IPv6 address
/// also accepts IPv4 clients.
pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    if addr.is_ipv6() {
        socket.set_only_v6(false).context("IPV6_V6ONLY")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;
    socket.listen(LISTEN_BACKLOG).context("listen()")?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).context("failed to convert to tokio TcpListener")
}

pub struct PingListener {
    listener: TcpListener,
    pinger: Pinger,
    grace: Duration,
    slots: Arc<Semaphore>,
    bucket: TokenBucket,
    shutdown: broadcast::Receiver<()>,
}

impl PingListener {
    pub fn new(
        config: &LatmeshConfig,
        listener: TcpListener,
        pinger: Pinger,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            pinger,
            grace: config.listener.grace(),
            slots: Arc::new(Semaphore::new(config.listener.max_connections)),
            bucket: TokenBucket::new(config.listener.accept_rate, config.listener.accept_burst),
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(mut self) -> Result<()> {
        tracing::info!(addr = ?self.local_addr().ok(), "ping listener starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("ping listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => self.admit(stream, remote),
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, remote: SocketAddr) {
        if !self.bucket.allow() {
            tracing::warn!(%remote, "accept rate exceeded, closing connection");
            return;
        }
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(%remote, "too many connections in flight, closing connection");
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let pinger = self.pinger.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            let _permit = permit;
            match pinger.answer(stream, grace).await {
                Ok(outcome) => tracing::info!(
                    role = Role::Server.tag(),
                    local = pinger.local_region(),
                    peer = %outcome.peer_region,
                    %remote,
                    rtt_us = outcome.rtt_us,
                    "measured"
                ),
                Err(e) => tracing::warn!(
                    role = Role::Server.tag(),
                    %remote,
                    error = %e,
                    "inbound ping failed"
                ),
            }
        });
    }
}
