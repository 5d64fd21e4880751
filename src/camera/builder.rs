use std::sync::Arc;

use super::backend::{CameraBackend, StreamRequest};
use super::session::CameraSession;
use super::synthetic::SyntheticCamera;
use crate::config::{CameraBackendKind, CameraConfig};
use crate::error::{MoodcamError, Result};

/// Builder for a camera session
pub struct CameraSessionBuilder {
    config: Option<CameraConfig>,
    backend: Option<Arc<dyn CameraBackend>>,
}

impl CameraSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            backend: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this backend instead of the one named in the configuration
    pub fn backend(mut self, backend: Arc<dyn CameraBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<CameraSession> {
        let config = self
            .config
            .ok_or_else(|| MoodcamError::system("Camera configuration must be specified"))?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => backend_for(config.backend)?,
        };

        Ok(CameraSession::new(backend, StreamRequest::from(&config)))
    }
}

impl Default for CameraSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn backend_for(kind: CameraBackendKind) -> Result<Arc<dyn CameraBackend>> {
    match kind {
        CameraBackendKind::Synthetic => Ok(Arc::new(SyntheticCamera::new())),
        #[cfg(all(feature = "camera", target_os = "linux"))]
        CameraBackendKind::Gstreamer => Ok(Arc::new(super::gst::GstCamera::new()?)),
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        CameraBackendKind::Gstreamer => Err(MoodcamError::system(
            "GStreamer camera backend requires the `camera` feature on Linux",
        )),
    }
}
