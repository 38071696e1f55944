//! Prediction endpoint - classify an upload and return the Grad-CAM overlay

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio::task::JoinError;
use tracing::{error, info, info_span, Instrument, Span};
use uuid::Uuid;

use idc_gradcam::api::UPLOAD_FIELD;
use idc_gradcam::utils::format_millis;
use idc_gradcam::{ErrorResponse, IdcError, PredictionResponse};

use crate::state::SharedState;

/// Any failure while serving a prediction; always a 500 with `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    detail: String,
}

impl ApiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl From<IdcError> for ApiError {
    fn from(e: IdcError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::new(format!("Invalid multipart body: {}", e.body_text()))
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        Self::new(format!("Inference task failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Prediction failed: {}", self.detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

/// Pull the upload out of the multipart body; other fields are ignored
async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let filename = field.file_name().unwrap_or("<unnamed>").to_string();
            let bytes = field.bytes().await?;
            info!("Received '{}' ({} bytes)", filename, bytes.len());
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::new(format!(
        "Missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

/// POST /predict/ - Classify an image and explain the decision
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id);

    async move {
        let bytes = read_upload(&mut multipart).await?;

        let span = Span::current();
        let output = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let engine = state.lock_engine();
            let output = engine.run(&bytes);
            output.map_err(ApiError::from)
        })
        .await??;

        info!(
            "{} (p = {:.3}) in {}",
            output.prediction.diagnosis,
            output.prediction.raw_probability,
            format_millis(output.elapsed_ms)
        );

        Ok(Json(output.into_response()?))
    }
    .instrument(span)
    .await
}
