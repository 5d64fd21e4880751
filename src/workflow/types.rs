use serde::{Deserialize, Serialize};
use std::fmt;

use super::notice::Notice;
use crate::blob::{BlobId, BlobMeta};
use crate::camera::StreamId;
use crate::error::{AnalysisError, CameraError};
use crate::prediction::PredictionResult;

/// Correlates an asynchronous camera attempt or analysis request with the
/// state that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub(crate) u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse state name, for events and display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    AwaitingSource,
    AcquiringCamera,
    CameraLive,
    PreviewReady,
    Analyzing,
    ResultReady,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::AwaitingSource => "awaiting source",
            Phase::AcquiringCamera => "acquiring camera",
            Phase::CameraLive => "camera live",
            Phase::PreviewReady => "preview ready",
            Phase::Analyzing => "analyzing",
            Phase::ResultReady => "result ready",
        };
        f.write_str(name)
    }
}

/// Everything the workflow knows about where it is
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    /// No image, camera inactive
    AwaitingSource,
    /// Waiting on the platform to grant or refuse camera access
    AcquiringCamera { attempt: Ticket },
    /// Stream open and previewing, no image yet
    CameraLive { stream: StreamId },
    /// Image and preview present, nothing in flight. `last_error` holds the
    /// previous analysis failure until a retry or a new image.
    PreviewReady {
        image: BlobMeta,
        last_error: Option<AnalysisError>,
    },
    Analyzing { image: BlobMeta, request: Ticket },
    ResultReady {
        image: BlobMeta,
        result: PredictionResult,
    },
}

impl WorkflowState {
    pub fn phase(&self) -> Phase {
        match self {
            WorkflowState::AwaitingSource => Phase::AwaitingSource,
            WorkflowState::AcquiringCamera { .. } => Phase::AcquiringCamera,
            WorkflowState::CameraLive { .. } => Phase::CameraLive,
            WorkflowState::PreviewReady { .. } => Phase::PreviewReady,
            WorkflowState::Analyzing { .. } => Phase::Analyzing,
            WorkflowState::ResultReady { .. } => Phase::ResultReady,
        }
    }

    /// Image the workflow currently holds, if any
    pub fn image(&self) -> Option<&BlobMeta> {
        match self {
            WorkflowState::PreviewReady { image, .. }
            | WorkflowState::Analyzing { image, .. }
            | WorkflowState::ResultReady { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn stream(&self) -> Option<StreamId> {
        match self {
            WorkflowState::CameraLive { stream } => Some(*stream),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match self {
            WorkflowState::ResultReady { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&AnalysisError> {
        match self {
            WorkflowState::PreviewReady { last_error, .. } => last_error.as_ref(),
            _ => None,
        }
    }
}

/// User actions and asynchronous completions fed into the machine
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    SelectFile(BlobMeta),
    StartCamera,
    CameraAcquired { attempt: Ticket, stream: StreamId },
    CameraFailed { attempt: Ticket, error: CameraError },
    PreviewFailed { stream: StreamId, error: CameraError },
    Capture,
    FrameCaptured { stream: StreamId, image: BlobMeta },
    CaptureFailed { stream: StreamId, error: CameraError },
    CancelCamera,
    Analyze,
    AnalysisSucceeded {
        request: Ticket,
        blob: BlobId,
        result: PredictionResult,
    },
    AnalysisFailed {
        request: Ticket,
        blob: BlobId,
        error: AnalysisError,
    },
    Reset,
}

impl Input {
    pub fn name(&self) -> &'static str {
        match self {
            Input::SelectFile(_) => "select_file",
            Input::StartCamera => "start_camera",
            Input::CameraAcquired { .. } => "camera_acquired",
            Input::CameraFailed { .. } => "camera_failed",
            Input::PreviewFailed { .. } => "preview_failed",
            Input::Capture => "capture",
            Input::FrameCaptured { .. } => "frame_captured",
            Input::CaptureFailed { .. } => "capture_failed",
            Input::CancelCamera => "cancel_camera",
            Input::Analyze => "analyze",
            Input::AnalysisSucceeded { .. } => "analysis_succeeded",
            Input::AnalysisFailed { .. } => "analysis_failed",
            Input::Reset => "reset",
        }
    }
}

/// Side effects the driver performs, in order, after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Make the staged candidate the current image and allocate its preview
    AdoptImage { blob: BlobId },
    /// Drop a staged candidate that was not adopted
    DiscardCandidate { blob: BlobId },
    /// Revoke the current preview and drop the current image
    DiscardImage { blob: BlobId },
    AcquireCamera { attempt: Ticket },
    AttachPreview { stream: StreamId },
    CaptureFrame { stream: StreamId },
    ReleaseCamera { stream: StreamId },
    StartAnalysis { request: Ticket, blob: BlobId },
    /// Abandon an in-flight camera attempt or analysis request
    Cancel { ticket: Ticket },
    Notify(Notice),
}

/// Result of one step of the machine
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: WorkflowState,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub(crate) fn to(state: WorkflowState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    pub(crate) fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}
