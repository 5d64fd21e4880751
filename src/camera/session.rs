use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::{CameraBackend, RawFrame, StreamRequest};
use super::encode::encode_png;
use super::stream::CameraStream;
use crate::blob::ImageBlob;
use crate::error::CameraError;

/// Acquisition, preview, capture and release of camera streams
#[derive(Clone)]
pub struct CameraSession {
    backend: Arc<dyn CameraBackend>,
    request: StreamRequest,
}

impl CameraSession {
    pub fn new(backend: Arc<dyn CameraBackend>, request: StreamRequest) -> Self {
        Self { backend, request }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    /// Request video-only access. Suspends until the platform answers.
    pub async fn acquire(&self) -> Result<CameraStream, CameraError> {
        info!(
            "Requesting {} camera {} ({}x{} @ {}fps)",
            self.backend.name(),
            self.request.device_index,
            self.request.resolution.0,
            self.request.resolution.1,
            self.request.fps
        );

        match self.backend.open(&self.request).await {
            Ok(source) => {
                let stream = CameraStream::new(source);
                info!(
                    "Camera stream {} acquired with {} track(s)",
                    stream.id(),
                    stream.track_count()
                );
                Ok(stream)
            }
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                Err(e)
            }
        }
    }

    /// Bind the stream to the live surface; playback runs until release
    pub fn attach_preview(&self, stream: &mut CameraStream) -> Result<(), CameraError> {
        stream.start_preview()
    }

    /// Latest frame for the live surface
    pub fn preview_frame(&self, stream: &mut CameraStream) -> Result<RawFrame, CameraError> {
        stream.grab_frame()
    }

    /// Rasterize the current frame into a PNG blob at native resolution
    pub fn capture_frame(&self, stream: &mut CameraStream) -> Result<ImageBlob, CameraError> {
        let frame = stream.grab_frame()?;
        let png = encode_png(&frame)?;

        debug!(
            "Captured {}x{} frame from stream {} ({} bytes PNG)",
            frame.width,
            frame.height,
            stream.id(),
            png.len()
        );

        Ok(ImageBlob::from_capture(frame.width, frame.height, png))
    }

    /// Stop all tracks and detach. Safe to call on a stopped stream.
    pub fn release(&self, stream: &mut CameraStream) {
        if !stream.release() {
            debug!("Camera stream {} already released", stream.id());
        }
    }
}
