//! Liveness check.
//!
//! Answers from process state alone, so a dead database or cache never
//! turns it red.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Seconds since the server state was built.
    pub uptime: f64,
    pub environment: String,
}

/// Current time as RFC 3339 UTC, e.g. `2024-05-01T12:00:00.123Z`.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// `GET /health`
#[utoipa::path(
    get, path = "/health", tag = "health",
    responses((status = 200, description = "Process is alive", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_owned(),
        timestamp: now_rfc3339(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        environment: state.config.environment.clone(),
    })
}
