//! The ping exchange, client and server roles.
//!
//! Both roles run the same steps on one TCP connection: write the local
//! region line, read the peer's line, then ask the kernel for its smoothed
//! RTT. The server additionally holds the socket open for a grace period so
//! the client can finish reading before teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;

use latmesh_core::wire::{self, WireError};
use latmesh_core::{LatmeshConfig, RttError, RttProbe};

/// Which end of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Short tag used in measurement log records.
    pub fn tag(self) -> &'static str {
        match self {
            Role::Client => "C",
            Role::Server => "S",
        }
    }
}

/// Result of one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingOutcome {
    /// The line the other side sent. Informational only.
    pub peer_region: String,
    pub rtt_us: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PingError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("handshake failed: {0}")]
    Wire(#[from] WireError),
    #[error("rtt extraction failed: {0}")]
    Rtt(#[from] RttError),
}

/// Everything needed to run either role. Cheap to clone.
#[derive(Clone)]
pub struct Pinger {
    local: Arc<str>,
    probe: Arc<dyn RttProbe>,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl Pinger {
    pub fn new(
        local: impl Into<String>,
        probe: Arc<dyn RttProbe>,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            local: Arc::from(local.into()),
            probe,
            connect_timeout,
            io_timeout,
        }
    }

    pub fn from_config(config: &LatmeshConfig, probe: Arc<dyn RttProbe>) -> Self {
        Self::new(
            config.identity.region.clone(),
            probe,
            config.network.connect_timeout(),
            config.network.io_timeout(),
        )
    }

    pub fn local_region(&self) -> &str {
        &self.local
    }

    /// Client role: dial `address`, exchange lines, read the RTT, close.
    pub async fn ping(&self, address: &str) -> Result<PingOutcome, PingError> {
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(PingError::Connect {
                    addr: address.to_string(),
                    source,
                })
            }
            Err(_) => return Err(PingError::ConnectTimeout(address.to_string())),
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        self.exchange(&mut stream).await
        // stream dropped here: connection closed
    }

    /// Server role on an accepted connection: exchange lines, read the RTT,
    /// then hold the connection for `grace` before it is dropped.
    pub async fn answer(
        &self,
        mut stream: TcpStream,
        grace: Duration,
    ) -> Result<PingOutcome, PingError> {
        let outcome = self.exchange(&mut stream).await?;
        tokio::time::sleep(grace).await;
        Ok(outcome)
    }

    /// The symmetric part: send our line, read theirs, query the kernel.
    pub async fn exchange(&self, stream: &mut TcpStream) -> Result<PingOutcome, PingError> {
        timeout(self.io_timeout, wire::write_line(stream, &self.local))
            .await
            .map_err(|_| PingError::HandshakeTimeout)??;

        let peer_region = {
            let mut reader = BufReader::new(&mut *stream);
            timeout(self.io_timeout, wire::read_line(&mut reader))
                .await
                .map_err(|_| PingError::HandshakeTimeout)??
        };

        let rtt_us = self.probe.smoothed_rtt(stream)?;
        Ok(PingOutcome {
            peer_region,
            rtt_us,
        })
    }
}
