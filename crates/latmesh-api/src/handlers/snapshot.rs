//! `/` and `/health` handlers.

use axum::extract::State;
use axum::http::header::{HeaderName, CONTENT_TYPE};

use latmesh_services::snapshot::{render_text, snapshot};

use super::ApiState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

type TextResponse = ([(HeaderName, &'static str); 1], String);

/// One `local\tpeer\tlatency_us` line per known peer.
pub async fn handle_snapshot(State(state): State<ApiState>) -> TextResponse {
    let body = render_text(&snapshot(&state.registry));
    ([(CONTENT_TYPE, TEXT_PLAIN)], body)
}

/// Liveness: always 200 with the local region as the body.
pub async fn handle_health(State(state): State<ApiState>) -> TextResponse {
    (
        [(CONTENT_TYPE, TEXT_PLAIN)],
        state.registry.local_region().to_string(),
    )
}
