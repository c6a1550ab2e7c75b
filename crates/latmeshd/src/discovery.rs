//! Region discovery.
//!
//! Periodically resolves the application's regions TXT record and adds every
//! listed region to the registry. With pruning enabled, regions that vanish
//! from a successful, non-empty answer are removed again.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use latmesh_core::LatmeshConfig;
use latmesh_services::registry::validate_identifier;
use latmesh_services::{split_regions, RegionRegistry, RegionResolver};

/// What one discovery cycle did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub invalid: Vec<String>,
    /// True if the resolver failed or returned nothing usable.
    pub skipped: bool,
}

pub struct Discovery {
    resolver: Arc<dyn RegionResolver>,
    registry: RegionRegistry,
    record: String,
    interval: Duration,
    prune_missing: bool,
    shutdown: broadcast::Receiver<()>,
}

impl Discovery {
    pub fn new(
        config: &LatmeshConfig,
        resolver: Arc<dyn RegionResolver>,
        registry: RegionRegistry,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            resolver,
            registry,
            record: config.regions_record(),
            interval: config.discovery.interval(),
            prune_missing: config.discovery.prune_missing,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        // First tick completes immediately.
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(record = %self.record, every = ?self.interval, "discovery starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("discovery shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    let report = self.run_once().await;
                    tracing::debug!(
                        peers = self.registry.len(),
                        added = report.added.len(),
                        removed = report.removed.len(),
                        invalid = report.invalid.len(),
                        skipped = report.skipped,
                        "discovery tick"
                    );
                }
            }
        }
    }

    /// One resolve-and-reconcile pass. Never fails; problems are logged
    /// and the next tick retries.
    pub async fn run_once(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let records = match self.resolver.lookup_txt(&self.record).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(record = %self.record, error = %e, "region lookup failed");
                report.skipped = true;
                return report;
            }
        };

        let Some(first) = records.first() else {
            tracing::warn!(record = %self.record, "no regions record found");
            report.skipped = true;
            return report;
        };
        if records.len() > 1 {
            tracing::warn!(
                record = %self.record,
                count = records.len(),
                "multiple regions records, using the first"
            );
        }

        let mut seen = HashSet::new();
        for region in split_regions(first) {
            if let Err(e) = validate_identifier(&region) {
                tracing::warn!(error = %e, "skipping region");
                report.invalid.push(region);
                continue;
            }
            if !self.registry.contains(&region) {
                match self.registry.lookup_or_create(&region) {
                    Ok(_) => report.added.push(region.clone()),
                    Err(e) => {
                        tracing::warn!(peer = %region, error = %e, "failed to add region");
                        continue;
                    }
                }
            }
            seen.insert(region);
        }

        if seen.is_empty() {
            tracing::warn!(record = %self.record, "regions record lists no usable regions");
            report.skipped = true;
            return report;
        }

        if self.prune_missing {
            report.removed = self.registry.retain_only(&seen);
        }
        report
    }
}
