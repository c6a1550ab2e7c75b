//! Region registry: every known peer region, keyed on its identifier.
//!
//! Written by discovery (insert, and removal when reconciliation is on),
//! read concurrently by the measurement scheduler and the HTTP layer.
//! DashMap shards the map so inserts never corrupt or block a reader for
//! longer than one shard visit.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use latmesh_core::LatmeshConfig;

use crate::peer::Peer;

/// Longest accepted region identifier (one DNS label).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Maps a region identifier to its dial address.
pub type AddressFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid region identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("latency histogram for {region}: {source}")]
    Metric {
        region: String,
        #[source]
        source: prometheus::Error,
    },
}

/// Shared handle to the registry. Cloning is cheap.
#[derive(Clone)]
pub struct RegionRegistry {
    local: Arc<str>,
    peers: Arc<DashMap<String, Arc<Peer>>>,
    metrics: prometheus::Registry,
    address_of: AddressFn,
}

impl RegionRegistry {
    /// Registry whose peers dial `<region>.<app>.internal:<ping_port>`.
    pub fn new(config: &LatmeshConfig) -> Self {
        let config = config.clone();
        Self::with_address_fn(
            config.identity.region.clone(),
            Arc::new(move |region: &str| config.peer_address(region)),
        )
    }

    /// Registry with a custom address derivation.
    pub fn with_address_fn(local: impl Into<String>, address_of: AddressFn) -> Self {
        Self {
            local: Arc::from(local.into()),
            peers: Arc::new(DashMap::new()),
            metrics: prometheus::Registry::new(),
            address_of,
        }
    }

    /// Identifier of the region this process runs in.
    pub fn local_region(&self) -> &str {
        &self.local
    }

    /// The metrics registry holding one histogram per peer.
    pub fn metrics(&self) -> &prometheus::Registry {
        &self.metrics
    }

    /// Return the peer for `identifier`, creating it on first sight.
    ///
    /// Creation is atomic per identifier: concurrent callers observe the
    /// same `Peer`, and an existing peer is never reset.
    pub fn lookup_or_create(&self, identifier: &str) -> Result<Arc<Peer>, RegistryError> {
        if let Some(peer) = self.peers.get(identifier) {
            return Ok(peer.value().clone());
        }
        validate_identifier(identifier)?;

        match self.peers.entry(identifier.to_string()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                let metric_err = |source| RegistryError::Metric {
                    region: identifier.to_string(),
                    source,
                };
                let address = (self.address_of)(identifier);
                let peer =
                    Arc::new(Peer::new(&self.local, identifier, address).map_err(metric_err)?);
                self.metrics
                    .register(Box::new(peer.histogram().clone()))
                    .map_err(metric_err)?;

                tracing::info!(peer = identifier, address = peer.address(), "peer added");
                e.insert(peer.clone());
                Ok(peer)
            }
        }
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<Peer>> {
        self.peers.get(identifier).map(|p| p.value().clone())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.peers.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Apply `f` to every current peer.
    ///
    /// `f` runs while a shard read lock is held: it must not call back into
    /// the registry's mutating methods. Async callers should use `peers()`.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Peer>)) {
        for entry in self.peers.iter() {
            f(entry.value());
        }
    }

    /// Point-in-time copy of all peers, safe to hold across await points.
    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    /// Remove every peer not in `keep`, dropping its histogram.
    /// Returns the removed identifiers.
    pub fn retain_only(&self, keep: &HashSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .peers
            .iter()
            .filter(|e| !keep.contains(e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for identifier in stale {
            if let Some((_, peer)) = self.peers.remove(&identifier) {
                if let Err(e) = self.metrics.unregister(Box::new(peer.histogram().clone())) {
                    tracing::warn!(peer = %identifier, error = %e, "failed to unregister histogram");
                }
                tracing::info!(peer = %identifier, "peer removed");
                removed.push(identifier);
            }
        }
        removed
    }
}

/// A region identifier is one DNS label: ASCII letters, digits, `-`, `_`.
pub fn validate_identifier(identifier: &str) -> Result<(), RegistryError> {
    let valid = !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && identifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidIdentifier(identifier.to_string()))
    }
}
