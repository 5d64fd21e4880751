use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

use super::backend::{CameraBackend, RawFrame, StreamRequest, VideoSource};
use crate::error::CameraError;

/// Distinguish a missing device from one the user may not open
fn check_device_access(device: &str) -> Result<(), CameraError> {
    match std::fs::OpenOptions::new().read(true).write(true).open(device) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(CameraError::PermissionDenied {
                details: format!("{}: {}", device, e),
            })
        }
        Err(e) => Err(CameraError::DeviceUnavailable {
            details: format!("{}: {}", device, e),
        }),
    }
}

/// V4L2 camera through a GStreamer pipeline ending in an RGB appsink
pub struct GstCamera;

impl GstCamera {
    pub fn new() -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self)
    }

    fn build_pipeline_string(device: &str, request: &StreamRequest) -> String {
        let (width, height) = request.resolution;
        format!(
            "v4l2src device={} io-mode=mmap ! \
             videoconvert ! \
             video/x-raw,format=RGB,width={},height={},framerate={}/1 ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
            device, width, height, request.fps
        )
    }

    /// Device checks, pipeline parsing and the READY transition all block,
    /// so this runs on the blocking pool
    fn open_blocking(request: StreamRequest) -> Result<GstSource, CameraError> {
        let device = format!("/dev/video{}", request.device_index);
        check_device_access(&device)?;

        let pipeline_desc = Self::build_pipeline_string(&device, &request);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        // v4l2src opens the device node on the READY transition
        if let Err(e) = pipeline.set_state(gstreamer::State::Ready) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::DeviceUnavailable {
                details: format!("{} refused to open: {}", device, e),
            });
        }

        Ok(GstSource {
            pipeline,
            appsink,
            resolution: request.resolution,
            last_sample: None,
        })
    }
}

#[async_trait]
impl CameraBackend for GstCamera {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn VideoSource>, CameraError> {
        let request = *request;
        let source = tokio::task::spawn_blocking(move || Self::open_blocking(request))
            .await
            .map_err(|e| CameraError::Configuration {
                details: format!("Camera open task failed: {}", e),
            })??;
        Ok(Box::new(source))
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

struct GstSource {
    pipeline: Pipeline,
    appsink: AppSink,
    resolution: (u32, u32),
    last_sample: Option<gstreamer::Sample>,
}

impl GstSource {
    fn sample_to_frame(sample: &gstreamer::Sample) -> Result<RawFrame, CameraError> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureFailed {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| CameraError::CaptureFailed {
            details: "No caps in sample".to_string(),
        })?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureFailed {
            details: format!("Failed to get video info: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_len = width as usize * 3;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::CaptureFailed {
                details: format!("Failed to map buffer: {}", e),
            })?;
        let data = map.as_slice();

        let needed = stride * (height as usize).saturating_sub(1) + row_len;
        if height == 0 || stride < row_len || data.len() < needed {
            return Err(CameraError::CaptureFailed {
                details: format!(
                    "buffer of {} bytes too small for {}x{} (stride {})",
                    data.len(),
                    width,
                    height,
                    stride
                ),
            });
        }

        let mut rgb = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            rgb.extend_from_slice(&data[start..start + row_len]);
        }

        Ok(RawFrame { width, height, rgb })
    }
}

impl VideoSource for GstSource {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn track_count(&self) -> usize {
        1
    }

    fn play(&mut self) -> Result<(), CameraError> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::DeviceUnavailable {
                details: format!("Failed to start GStreamer pipeline: {}", e),
            })?;
        info!("GStreamer camera pipeline playing");
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<RawFrame, CameraError> {
        if let Some(sample) = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(2))
        {
            self.last_sample = Some(sample);
        } else {
            warn!("No fresh camera sample within 2s; using the last one");
        }

        let sample = self
            .last_sample
            .as_ref()
            .ok_or_else(|| CameraError::CaptureFailed {
                details: "camera has not produced a frame yet".to_string(),
            })?;

        let frame = Self::sample_to_frame(sample)?;
        self.resolution = (frame.width, frame.height);
        Ok(frame)
    }

    fn stop(&mut self) {
        self.last_sample = None;
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline: {}", e);
        }
        debug!("GStreamer camera pipeline stopped");
    }
}
