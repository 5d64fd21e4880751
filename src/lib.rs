pub mod analysis;
pub mod blob;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod prediction;
pub mod preview;
pub mod validator;
pub mod workflow;

pub use analysis::{AnalysisClient, PredictionService};
pub use blob::{BlobId, BlobMeta, ImageBlob, ImageSource};
pub use camera::{
    CameraBackend, CameraSession, CameraSessionBuilder, CameraStream, StreamId, SyntheticCamera,
};
pub use config::{FallbackMode, MoodcamConfig};
pub use error::{MoodcamError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, WorkflowEvent};
pub use prediction::{Expression, PredictionResult, Provenance};
pub use preview::{PreviewHandle, PreviewId, PreviewRegistry};
pub use validator::ImageValidator;
pub use workflow::{AcquisitionWorkflow, Command, Notice, Phase, Severity, WorkflowState};
