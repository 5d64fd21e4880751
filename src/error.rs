use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoodcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },
}

impl MoodcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Reasons a candidate image is refused before any network or UI work
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Invalid file type: {media_type}")]
    InvalidType { media_type: String },

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

/// Camera acquisition and capture failures
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraError {
    #[error("Camera permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("Camera device unavailable: {details}")]
    DeviceUnavailable { details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Frame capture failed: {details}")]
    CaptureFailed { details: String },

    #[error("Camera stream {stream} has already been released")]
    StreamReleased { stream: String },
}

/// Failures talking to the prediction service
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisError {
    #[error("Transport failure: {details}")]
    Transport { details: String },

    #[error("Prediction service returned HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed prediction response: {details}")]
    MalformedResponse { details: String },

    #[error("Prediction request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Prediction request was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AnalysisError::MalformedResponse {
                details: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            AnalysisError::Status {
                status: status.as_u16(),
            }
        } else {
            AnalysisError::Transport {
                details: e.to_string(),
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {missed} events")]
    Lagged { missed: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, MoodcamError>;
