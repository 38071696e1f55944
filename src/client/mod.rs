//! IDC Backend Client
//!
//! HTTP client for the inference server, used by the `idc` CLI.
//! The server location comes from `BACKEND_URL` (default `http://127.0.0.1:8000`).

pub mod gallery;

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::api::{LivenessResponse, PredictionResponse, PREDICT_PATH, UPLOAD_FIELD};
use crate::utils::error::{IdcError, Result};

pub use gallery::{SampleGallery, SampleImage, DEFAULT_SAMPLES_DIR};

/// Backend used when `BACKEND_URL` is unset
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Environment variable overriding the backend location
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

/// Timeout of the connectivity probe
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout of a prediction request; Grad-CAM on CPU can take a while
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of the connectivity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    NotReachable,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Pick the backend URL from an optional override
pub fn resolve_backend_url(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
}

/// MIME type sent for an upload, from its file extension
pub fn mime_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Client for the IDC inference server
#[derive(Debug, Clone)]
pub struct IdcClient {
    base_url: String,
    client: reqwest::Client,
}

impl IdcClient {
    /// Create a client for `url`
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a client for `BACKEND_URL`, or the default location
    pub fn from_env() -> Result<Self> {
        Self::new(&resolve_backend_url(std::env::var(BACKEND_URL_ENV).ok()))
    }

    /// Base URL without trailing slash
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of the prediction endpoint
    pub fn predict_url(&self) -> String {
        format!("{}{}", self.base_url, PREDICT_PATH)
    }

    /// Quick connectivity probe against `GET /`
    ///
    /// Any HTTP answer counts as connected; only transport failures
    /// (refused, timed out, bad address) count as not reachable.
    pub async fn status(&self) -> ConnectionStatus {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).timeout(STATUS_TIMEOUT).send().await {
            Ok(response) => {
                debug!("Backend answered {} at {}", response.status(), url);
                ConnectionStatus::Connected
            }
            Err(e) => {
                debug!("Backend not reachable at {}: {}", url, e);
                ConnectionStatus::NotReachable
            }
        }
    }

    /// Fetch the liveness message
    pub async fn liveness(&self) -> Result<LivenessResponse> {
        let url = format!("{}/", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(IdcError::Backend(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Upload one image and return the parsed prediction
    pub async fn predict(&self, bytes: Vec<u8>, filename: &str) -> Result<PredictionResponse> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(self.predict_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!("Backend returned {}: {}", status, body);
            return Err(IdcError::Backend(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn spawn_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_backend_url_resolution() {
        assert_eq!(resolve_backend_url(None), DEFAULT_BACKEND_URL);
        assert_eq!(resolve_backend_url(Some("  ".into())), DEFAULT_BACKEND_URL);
        assert_eq!(
            resolve_backend_url(Some("http://gpu-box:9000".into())),
            "http://gpu-box:9000"
        );
    }

    #[test]
    fn test_urls() {
        let client = IdcClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.url(), "http://localhost:8000");
        assert_eq!(client.predict_url(), "http://localhost:8000/predict/");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("slide.PNG"), "image/png");
        assert_eq!(mime_for("slide.jpeg"), "image/jpeg");
        assert_eq!(mime_for("slide"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_status_not_reachable() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = IdcClient::new(&format!("http://{}", addr)).unwrap();
        assert_eq!(client.status().await, ConnectionStatus::NotReachable);
    }

    #[tokio::test]
    async fn test_status_and_liveness() {
        let router = Router::new().route(
            "/",
            get(|| async { Json(json!({"message": "IDC Detection API Running"})) }),
        );
        let client = IdcClient::new(&spawn_stub(router).await).unwrap();

        assert!(client.status().await.is_connected());
        assert_eq!(client.liveness().await.unwrap(), LivenessResponse::default());
    }

    #[tokio::test]
    async fn test_predict_sends_file_field() {
        let router = Router::new().route(
            "/predict/",
            post(|mut multipart: Multipart| async move {
                let field = multipart.next_field().await.unwrap().unwrap();
                assert_eq!(field.name(), Some("file"));
                assert_eq!(field.content_type(), Some("image/png"));
                let data = field.bytes().await.unwrap();
                Json(json!({
                    "Prediction": "Benign",
                    "Malignant Probability": 0.1,
                    "Benign Probability": 0.9,
                    "GradCAM": format!("{}", data.len()),
                }))
            }),
        );
        let client = IdcClient::new(&spawn_stub(router).await).unwrap();

        let response = client.predict(vec![1, 2, 3], "tile.png").await.unwrap();
        assert_eq!(response.gradcam, "3");
        assert_eq!(response.benign_probability, 0.9);
    }

    #[tokio::test]
    async fn test_predict_error_status() {
        let router = Router::new().route(
            "/predict/",
            post(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "cannot identify image file"})),
                )
            }),
        );
        let client = IdcClient::new(&spawn_stub(router).await).unwrap();

        let result = client.predict(b"garbage".to_vec(), "notes.txt").await;
        assert!(matches!(result, Err(IdcError::Backend(500))));
    }
}
