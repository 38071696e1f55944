//! HTTP routes

pub mod health;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use idc_gradcam::api::PREDICT_PATH;

use crate::state::SharedState;

/// Build the application router
pub fn build_router(state: SharedState) -> Router {
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route(PREDICT_PATH, post(predict::predict))
        .route("/predict", post(predict::predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
