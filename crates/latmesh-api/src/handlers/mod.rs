//! HTTP handlers: latency snapshot, health, metrics and a JSON peer view.

pub mod metrics;
pub mod peers;
pub mod snapshot;

use latmesh_services::RegionRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub registry: RegionRegistry,
}

impl ApiState {
    pub fn new(registry: RegionRegistry) -> Self {
        Self { registry }
    }
}

// Re-export handler functions for use in router setup.
pub use metrics::handle_metrics;
pub use peers::handle_peers;
pub use snapshot::{handle_health, handle_snapshot};
