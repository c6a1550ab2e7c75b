//! `/peers`: JSON view of the registry with per-peer sample counters.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub region: String,
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Serialize)]
pub struct PeerInfo {
    pub region: String,
    pub address: String,
    pub last_latency_us: u64,
    pub samples: u64,
    /// None until the first successful measurement.
    pub last_measured_secs_ago: Option<u64>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let mut peers: Vec<PeerInfo> = state
        .registry
        .peers()
        .iter()
        .map(|p| PeerInfo {
            region: p.identifier().to_string(),
            address: p.address().to_string(),
            last_latency_us: p.last_latency_us(),
            samples: p.samples(),
            last_measured_secs_ago: p.last_measured().map(|t| t.elapsed().as_secs()),
        })
        .collect();
    peers.sort_by(|a, b| a.region.cmp(&b.region));

    Json(PeersResponse {
        region: state.registry.local_region().to_string(),
        peers,
    })
}
