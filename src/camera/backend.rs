use async_trait::async_trait;

use crate::config::CameraConfig;
use crate::error::CameraError;

/// Parameters for a video-only stream request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub device_index: u32,
    pub resolution: (u32, u32),
    pub fps: u32,
}

impl From<&CameraConfig> for StreamRequest {
    fn from(config: &CameraConfig) -> Self {
        Self {
            device_index: config.index,
            resolution: config.resolution,
            fps: config.fps,
        }
    }
}

/// One uncompressed RGB24 frame at the stream's native resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RawFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Platform access to camera hardware
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Request a video-only stream. May wait on a permission prompt.
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn VideoSource>, CameraError>;

    fn name(&self) -> &str;
}

/// An opened device stream with stoppable tracks
pub trait VideoSource: Send {
    /// Native resolution the device negotiated
    fn resolution(&self) -> (u32, u32);

    fn track_count(&self) -> usize;

    /// Start live playback
    fn play(&mut self) -> Result<(), CameraError>;

    /// Most recent frame from the live stream
    fn grab_frame(&mut self) -> Result<RawFrame, CameraError>;

    /// Stop every track. Called at most once per source.
    fn stop(&mut self);
}
