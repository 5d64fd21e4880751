use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};

use super::backend::RawFrame;
use crate::error::CameraError;

/// Encode an RGB24 frame as PNG without rescaling
pub fn encode_png(frame: &RawFrame) -> Result<Vec<u8>, CameraError> {
    let expected = RawFrame::expected_len(frame.width, frame.height);
    if frame.width == 0 || frame.height == 0 || frame.rgb.len() != expected {
        return Err(CameraError::CaptureFailed {
            details: format!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                frame.rgb.len(),
                expected,
                frame.width,
                frame.height
            ),
        });
    }

    let mut png = Vec::with_capacity(expected / 2);
    PngEncoder::new(&mut png)
        .write_image(&frame.rgb, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| CameraError::CaptureFailed {
            details: format!("PNG encoding failed: {}", e),
        })?;

    Ok(png)
}
