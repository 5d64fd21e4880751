use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::backend::{CameraBackend, RawFrame, StreamRequest, VideoSource};
use crate::error::CameraError;

/// How the synthetic device answers an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticAccess {
    Grant,
    DenyPermission,
    NoDevice,
}

/// Counters shared with every stream the synthetic camera opens
#[derive(Debug, Clone, Default)]
pub struct CameraProbe {
    open: Arc<AtomicUsize>,
    opened: Arc<AtomicU64>,
    stopped: Arc<AtomicU64>,
}

impl CameraProbe {
    /// Streams currently holding the device
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn total_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn total_stopped(&self) -> u64 {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Camera that produces a moving test pattern, for headless runs and tests
pub struct SyntheticCamera {
    access: SyntheticAccess,
    permission_delay: Duration,
    probe: CameraProbe,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            access: SyntheticAccess::Grant,
            permission_delay: Duration::ZERO,
            probe: CameraProbe::default(),
        }
    }

    pub fn with_access(mut self, access: SyntheticAccess) -> Self {
        self.access = access;
        self
    }

    /// Simulate the time a user spends on the permission prompt
    pub fn with_permission_delay(mut self, delay: Duration) -> Self {
        self.permission_delay = delay;
        self
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraBackend for SyntheticCamera {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn VideoSource>, CameraError> {
        if !self.permission_delay.is_zero() {
            tokio::time::sleep(self.permission_delay).await;
        }

        match self.access {
            SyntheticAccess::DenyPermission => {
                return Err(CameraError::PermissionDenied {
                    details: "user dismissed the camera prompt".to_string(),
                })
            }
            SyntheticAccess::NoDevice => {
                return Err(CameraError::DeviceUnavailable {
                    details: format!("no synthetic device at index {}", request.device_index),
                })
            }
            SyntheticAccess::Grant => {}
        }

        let (width, height) = request.resolution;
        if width == 0 || height == 0 {
            return Err(CameraError::Configuration {
                details: format!("invalid resolution {}x{}", width, height),
            });
        }

        self.probe.open.fetch_add(1, Ordering::SeqCst);
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        info!(
            "Synthetic camera opened ({}x{} @ {}fps)",
            width, height, request.fps
        );

        Ok(Box::new(SyntheticSource {
            width,
            height,
            frame_counter: 0,
            playing: false,
            stopped: false,
            probe: self.probe.clone(),
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticSource {
    width: u32,
    height: u32,
    frame_counter: u64,
    playing: bool,
    stopped: bool,
    probe: CameraProbe,
}

impl VideoSource for SyntheticSource {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn track_count(&self) -> usize {
        1
    }

    fn play(&mut self) -> Result<(), CameraError> {
        self.playing = true;
        debug!("Synthetic camera playback started");
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<RawFrame, CameraError> {
        if !self.playing {
            return Err(CameraError::CaptureFailed {
                details: "stream is not playing".to_string(),
            });
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        // Diagonal gradient that shifts with every frame
        let shift = (frame_id % 256) as u32;
        let mut rgb = Vec::with_capacity(RawFrame::expected_len(self.width, self.height));
        for y in 0..self.height {
            for x in 0..self.width {
                rgb.push(((x + shift) % 256) as u8);
                rgb.push(((y + shift) % 256) as u8);
                rgb.push(((x + y) % 256) as u8);
            }
        }

        trace!(
            "Generated synthetic frame {} ({}x{})",
            frame_id,
            self.width,
            self.height
        );

        Ok(RawFrame {
            width: self.width,
            height: self.height,
            rgb,
        })
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.playing = false;
        self.probe.open.fetch_sub(1, Ordering::SeqCst);
        self.probe.stopped.fetch_add(1, Ordering::SeqCst);
        debug!("Synthetic camera track stopped");
    }
}
