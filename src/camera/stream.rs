use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{RawFrame, VideoSource};
use crate::error::CameraError;

/// Identity of an opened camera stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live handle to camera hardware.
///
/// Released explicitly by the session on every exit from the live state, and
/// on drop if that never happened.
pub struct CameraStream {
    id: StreamId,
    source: Box<dyn VideoSource>,
    live: bool,
    previewing: bool,
    opened_at: Instant,
}

impl CameraStream {
    pub(crate) fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            id: StreamId::new(),
            source,
            live: true,
            previewing: false,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.source.resolution()
    }

    pub fn track_count(&self) -> usize {
        self.source.track_count()
    }

    pub(crate) fn start_preview(&mut self) -> Result<(), CameraError> {
        self.ensure_live()?;
        if self.previewing {
            return Ok(());
        }
        self.source.play()?;
        self.previewing = true;
        debug!("Camera stream {} attached to preview", self.id);
        Ok(())
    }

    pub(crate) fn grab_frame(&mut self) -> Result<RawFrame, CameraError> {
        self.ensure_live()?;
        self.source.grab_frame()
    }

    /// Stop all tracks and detach from the preview. Returns false if the
    /// stream was already stopped.
    pub fn release(&mut self) -> bool {
        if !self.live {
            return false;
        }

        self.source.stop();
        self.live = false;
        self.previewing = false;

        info!(
            "Camera stream {} released after {:?}",
            self.id,
            self.opened_at.elapsed()
        );
        true
    }

    fn ensure_live(&self) -> Result<(), CameraError> {
        if self.live {
            Ok(())
        } else {
            Err(CameraError::StreamReleased {
                stream: self.id.to_string(),
            })
        }
    }
}

impl fmt::Debug for CameraStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraStream")
            .field("id", &self.id)
            .field("live", &self.live)
            .field("previewing", &self.previewing)
            .finish()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        if self.live {
            warn!("Camera stream {} dropped while live; releasing", self.id);
            self.release();
        }
    }
}
