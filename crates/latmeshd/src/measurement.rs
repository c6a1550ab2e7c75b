//! Measurement scheduler.
//!
//! Every tick, pings each registered peer in the client role and records the
//! kernel RTT. Peers are measured concurrently up to a fixed limit; a slow
//! cycle delays the next tick instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use latmesh_core::LatmeshConfig;
use latmesh_services::{Peer, Pinger, RegionRegistry, Role};

pub struct Measurement {
    pinger: Pinger,
    registry: RegionRegistry,
    interval: Duration,
    concurrency: usize,
    shutdown: broadcast::Receiver<()>,
}

impl Measurement {
    pub fn new(
        config: &LatmeshConfig,
        pinger: Pinger,
        registry: RegionRegistry,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            pinger,
            registry,
            interval: config.measurement.interval(),
            concurrency: config.measurement.concurrency.max(1),
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(every = ?self.interval, concurrency = self.concurrency, "measurement starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("measurement shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    let measured = self.run_once().await;
                    tracing::debug!(peers = self.registry.len(), measured, "measurement tick");
                }
            }
        }
    }

    /// Measure every current peer once. Returns how many succeeded.
    pub async fn run_once(&self) -> usize {
        let peers = self.registry.peers();
        stream::iter(peers)
            .map(|peer| self.measure(peer))
            .buffer_unordered(self.concurrency)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await
    }

    async fn measure(&self, peer: Arc<Peer>) -> bool {
        match self.pinger.ping(peer.address()).await {
            Ok(outcome) => {
                peer.record(outcome.rtt_us);
                tracing::info!(
                    role = Role::Client.tag(),
                    local = self.pinger.local_region(),
                    peer = peer.identifier(),
                    answered_as = %outcome.peer_region,
                    rtt_us = outcome.rtt_us,
                    "measured"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    role = Role::Client.tag(),
                    peer = peer.identifier(),
                    address = peer.address(),
                    error = %e,
                    "measurement failed"
                );
                false
            }
        }
    }
}
