use serde::{Deserialize, Serialize};

use super::types::Phase;
use crate::error::{AnalysisError, CameraError, ValidationError};
use crate::prediction::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Destructive,
}

/// User-visible, non-fatal message raised by a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notice {
    Rejected(ValidationError),
    CameraUnavailable(CameraError),
    CaptureFailed(CameraError),
    AnalysisFailed {
        error: AnalysisError,
        placeholder_shown: bool,
    },
    AnalysisComplete { expression: Expression },
    ActionUnavailable { action: String, phase: Phase },
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Rejected(ValidationError::InvalidType { .. }) => "Invalid file type",
            Notice::Rejected(ValidationError::TooLarge { .. }) => "File too large",
            Notice::CameraUnavailable(CameraError::PermissionDenied { .. }) => {
                "Camera access denied"
            }
            Notice::CameraUnavailable(_) => "Camera unavailable",
            Notice::CaptureFailed(_) => "Capture failed",
            Notice::AnalysisFailed { .. } => "Error analyzing image",
            Notice::AnalysisComplete { .. } => "Analysis Complete",
            Notice::ActionUnavailable { .. } => "Action unavailable",
        }
    }

    pub fn description(&self) -> String {
        match self {
            Notice::Rejected(ValidationError::InvalidType { .. }) => {
                "Please upload an image file (JPEG or PNG)".to_string()
            }
            Notice::Rejected(ValidationError::TooLarge { limit, .. }) => format!(
                "Please upload an image smaller than {}MB",
                limit / (1024 * 1024)
            ),
            Notice::CameraUnavailable(CameraError::PermissionDenied { .. }) => {
                "Please enable camera access to use this feature".to_string()
            }
            Notice::CameraUnavailable(e) => format!("No usable camera: {}", e),
            Notice::CaptureFailed(e) => format!("Could not take a photo: {}", e),
            Notice::AnalysisFailed {
                placeholder_shown: true,
                ..
            } => "There was a problem connecting to the server. Showing a placeholder result."
                .to_string(),
            Notice::AnalysisFailed { .. } => {
                "There was a problem connecting to the server. Please try again.".to_string()
            }
            Notice::AnalysisComplete { expression } => {
                format!("Detected emotion: {}", expression)
            }
            Notice::ActionUnavailable { action, phase } => {
                format!("Cannot {} while {}", action.replace('_', " "), phase)
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Notice::AnalysisComplete { .. } => Severity::Info,
            _ => Severity::Destructive,
        }
    }
}
