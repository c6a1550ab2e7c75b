//! `/metrics`: prometheus text exposition of the per-peer histograms.

use axum::extract::State;
use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::StatusCode;
use prometheus::{Encoder, TextEncoder};

use super::ApiState;

pub async fn handle_metrics(
    State(state): State<ApiState>,
) -> Result<([(HeaderName, &'static str); 1], Vec<u8>), (StatusCode, String)> {
    let families = state.registry.metrics().gather();
    let mut body = Vec::new();
    TextEncoder::new().encode(&families, &mut body).map_err(|e| {
        tracing::warn!(error = %e, "failed to encode metrics");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
