//! Latest-latency snapshot of the registry.

use std::fmt;

use serde::Serialize;

use crate::registry::RegionRegistry;

/// One line of the snapshot: local region, peer region, last RTT (µs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRow {
    pub local: String,
    pub peer: String,
    pub last_latency_us: u64,
}

impl fmt::Display for SnapshotRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.local, self.peer, self.last_latency_us)
    }
}

/// Current last-latency of every peer, ordered by peer identifier.
/// Never touches the network.
pub fn snapshot(registry: &RegionRegistry) -> Vec<SnapshotRow> {
    let local = registry.local_region().to_string();
    let mut rows = Vec::with_capacity(registry.len());
    registry.for_each(|peer| {
        rows.push(SnapshotRow {
            local: local.clone(),
            peer: peer.identifier().to_string(),
            last_latency_us: peer.last_latency_us(),
        })
    });
    rows.sort_by(|a, b| a.peer.cmp(&b.peer));
    rows
}

/// Plain-text body: one `local\tpeer\tlatency\n` line per row.
pub fn render_text(rows: &[SnapshotRow]) -> String {
    rows.iter().map(|row| format!("{row}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use latmesh_core::LatmeshConfig;

    fn registry() -> RegionRegistry {
        let mut config = LatmeshConfig::default();
        config.identity.region = "iad".into();
        config.identity.app_name = "probe".into();
        RegionRegistry::new(&config)
    }

    #[test]
    fn empty_registry_renders_empty_body() {
        let rows = snapshot(&registry());
        assert!(rows.is_empty());
        assert_eq!(render_text(&rows), "");
    }

    #[test]
    fn measured_peer_renders_tab_separated_line() {
        let registry = registry();
        registry.lookup_or_create("ams").unwrap().record(1523);

        let rows = snapshot(&registry);
        assert_eq!(rows[0].to_string(), "iad\tams\t1523");
        assert_eq!(render_text(&rows), "iad\tams\t1523\n");
    }

    #[test]
    fn unmeasured_peers_report_zero_sorted_by_peer() {
        let registry = registry();
        registry.lookup_or_create("sin").unwrap();
        registry.lookup_or_create("ams").unwrap().record(900);

        assert_eq!(
            render_text(&snapshot(&registry)),
            "iad\tams\t900\niad\tsin\t0\n"
        );
    }

    #[test]
    fn snapshot_reflects_only_latest_sample() {
        let registry = registry();
        let ams = registry.lookup_or_create("ams").unwrap();
        ams.record(5000);
        ams.record(1200);

        let rows = snapshot(&registry);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_latency_us, 1200);
    }
}
