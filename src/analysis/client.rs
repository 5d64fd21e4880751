use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::blob::ImageBlob;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::prediction::{Expression, PredictionResult};

/// Anything that can turn an image into a prediction
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn analyze(&self, blob: &ImageBlob) -> Result<PredictionResult, AnalysisError>;
}

/// Wire shape of a successful prediction response
#[derive(Debug, Clone, Deserialize)]
struct PredictResponse {
    expression: String,
    confidence: f64,
}

impl PredictResponse {
    fn into_result(self) -> Result<PredictionResult, AnalysisError> {
        let expression: Expression =
            self.expression
                .parse()
                .map_err(|e: String| AnalysisError::MalformedResponse { details: e })?;

        PredictionResult::new(expression, self.confidence as f32).ok_or_else(|| {
            AnalysisError::MalformedResponse {
                details: format!("confidence {} outside [0, 1]", self.confidence),
            }
        })
    }
}

/// HTTP client for the remote prediction endpoint. Uploads the image as
/// multipart field `file` and parses the `{ "expression", "confidence" }`
/// reply. One POST per call; retries and timeouts belong to the workflow.
pub struct AnalysisClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AnalysisClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AnalysisError::Transport {
                details: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Self::new(config.endpoint.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(blob: &ImageBlob) -> Result<Form, AnalysisError> {
        let part = Part::bytes(blob.data().to_vec())
            .file_name(blob.file_name().to_string())
            .mime_str(blob.media_type())
            .map_err(|e| AnalysisError::Transport {
                details: format!("Invalid media type '{}': {}", blob.media_type(), e),
            })?;

        Ok(Form::new().part("file", part))
    }
}

#[async_trait]
impl PredictionService for AnalysisClient {
    async fn analyze(&self, blob: &ImageBlob) -> Result<PredictionResult, AnalysisError> {
        debug!(
            "Posting blob {} ({} bytes, {}) to {}",
            blob.id(),
            blob.size(),
            blob.media_type(),
            self.endpoint
        );

        let form = Self::build_form(blob)?;
        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("Prediction request failed: {}", e);
                AnalysisError::Transport {
                    details: e.to_string(),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Prediction service returned {}: {}", status, body);
            return Err(AnalysisError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(AnalysisError::from)?;
        let parsed: PredictResponse =
            serde_json::from_slice(&body).map_err(|e| AnalysisError::MalformedResponse {
                details: e.to_string(),
            })?;
        let result = parsed.into_result()?;

        info!(
            "Blob {} analyzed: {} ({}%)",
            blob.id(),
            result.expression(),
            result.confidence_percent()
        );

        Ok(result)
    }
}
