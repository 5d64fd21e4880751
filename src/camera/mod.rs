mod backend;
mod builder;
mod encode;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod session;
mod stream;
mod synthetic;

pub use backend::{CameraBackend, RawFrame, StreamRequest, VideoSource};
pub use builder::CameraSessionBuilder;
pub use encode::encode_png;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCamera;
pub use session::CameraSession;
pub use stream::{CameraStream, StreamId};
pub use synthetic::{CameraProbe, SyntheticAccess, SyntheticCamera};
