//! Health endpoint (§4.9).
//!
//! This broker has no database or cache to probe, so unlike the teacher's
//! `/health` (which checks Postgres and Redis connectivity) this is a pure
//! liveness check: if the process can answer, it is healthy.

use axum::Json;
use serde::Serialize;

/// Health check response body.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// `GET /health` — no auth, no room-state access.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
