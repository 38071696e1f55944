//! Liveness and health endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use idc_gradcam::backend::backend_name;
use idc_gradcam::{LivenessResponse, VERSION};

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub backend: String,
    pub layer: String,
}

/// GET / - Liveness message
pub async fn root() -> Json<LivenessResponse> {
    Json(LivenessResponse::default())
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: VERSION.to_string(),
        backend: backend_name().to_string(),
        layer: state.config.gradcam_layer.clone(),
    })
}
