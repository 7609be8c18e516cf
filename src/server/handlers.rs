//! HTTP request handlers.
//!
//! The web layer stays thin: handlers deserialize, delegate to the engine,
//! and map outcomes onto status codes. Admission rejections arrive here as
//! errors and surface as 503 with the rejection reason.

use axum::{extract::State, Json};
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::server::state::AppState;
use crate::telemetry::PerformanceTrends;
use crate::types::{GenerationRequest, GenerationResult, SystemStatus};

/// POST /v1/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResult>> {
    debug!(content_type = %request.content_type, batch_size = request.batch_size, "Generation request received");
    let result = state.engine.generate(request).await?;
    Ok(Json(result))
}

/// GET /v1/status
pub async fn status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(state.engine.system_status())
}

/// GET /v1/trends
pub async fn trends(State(state): State<AppState>) -> Json<PerformanceTrends> {
    Json(state.engine.trends())
}

/// POST /v1/export/hardware
pub async fn export_hardware(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.engine.export_hardware_metrics()?;
    Ok(Json(json!({ "exported": true })))
}

/// GET /health
///
/// Degraded still serves traffic; it reports 200 with the state so load
/// balancers keep routing while operators see the condition.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.engine.system_status();
    Json(json!({
        "state": status.engine_state,
        "memory": status.memory_status,
    }))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
