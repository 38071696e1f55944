//! HTTP wire types shared by the inference server and the client.

use serde::{Deserialize, Serialize};

use crate::inference::{Diagnosis, Prediction};

/// Prediction endpoint path (trailing slash included)
pub const PREDICT_PATH: &str = "/predict/";

/// Multipart field carrying the image bytes
pub const UPLOAD_FIELD: &str = "file";

/// Body of `GET /`
pub const LIVENESS_MESSAGE: &str = "IDC Detection API Running";

/// JSON body returned by `POST /predict/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(rename = "Prediction")]
    pub prediction: Diagnosis,

    #[serde(rename = "Malignant Probability")]
    pub malignant_probability: f32,

    #[serde(rename = "Benign Probability")]
    pub benign_probability: f32,

    /// Base64-encoded PNG of the Grad-CAM overlay
    #[serde(rename = "GradCAM")]
    pub gradcam: String,
}

impl PredictionResponse {
    pub fn new(prediction: &Prediction, gradcam: String) -> Self {
        Self {
            prediction: prediction.diagnosis,
            malignant_probability: prediction.malignant_probability,
            benign_probability: prediction.benign_probability,
            gradcam,
        }
    }
}

/// Body of `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub message: String,
}

impl Default for LivenessResponse {
    fn default() -> Self {
        Self {
            message: LIVENESS_MESSAGE.to_string(),
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
