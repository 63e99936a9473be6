// SPDX-License-Identifier: GPL-3.0-only

//! Still capture from a frame slot
//!
//! A still is the latest frame the slot holds at the time of the call. No
//! new frame is requested from the hardware, so capture never interrupts the
//! preview stream.

use crate::backends::camera::types::{Frame, PixelFormat, SharedFrame, VideoOrientation};
use crate::errors::{CaptureError, CaptureResult};
use crate::session::FrameSlot;
use image::RgbaImage;
use image::imageops;
use tracing::debug;

/// Photo capture handler
pub struct PhotoCapture;

impl PhotoCapture {
    /// Snapshot the slot's current frame
    pub fn capture_from_slot(slot: &FrameSlot) -> CaptureResult<SharedFrame> {
        let frame = slot.peek().ok_or(CaptureError::NoFrameAvailable)?;
        debug!(
            position = %slot.position(),
            width = frame.width,
            height = frame.height,
            sequence = frame.sequence,
            "Frame captured from slot"
        );
        Ok(frame)
    }

    /// Snapshot the slot and convert to an upright RGBA image
    pub fn capture_image(slot: &FrameSlot) -> CaptureResult<RgbaImage> {
        let frame = Self::capture_from_slot(slot)?;
        frame_to_oriented_rgba(&frame)
    }
}

/// Convert a frame to RGBA and rotate it upright by its capture orientation
pub fn frame_to_oriented_rgba(frame: &Frame) -> CaptureResult<RgbaImage> {
    let image = frame_to_rgba(frame)?;
    Ok(orient_image(image, frame.orientation))
}

/// Rotate a sensor-order image clockwise by `orientation`
pub fn orient_image(image: RgbaImage, orientation: VideoOrientation) -> RgbaImage {
    match orientation {
        VideoOrientation::Portrait => image,
        VideoOrientation::LandscapeRight => imageops::rotate90(&image),
        VideoOrientation::PortraitUpsideDown => imageops::rotate180(&image),
        VideoOrientation::LandscapeLeft => imageops::rotate270(&image),
    }
}

/// Convert a frame into a tightly packed RGBA image, dropping row padding
pub fn frame_to_rgba(frame: &Frame) -> CaptureResult<RgbaImage> {
    if !frame.is_well_formed() {
        return Err(CaptureError::CompositionFailed(format!(
            "malformed {}x{} frame (stride {}, {} bytes)",
            frame.width,
            frame.height,
            frame.stride,
            frame.data.len()
        )));
    }

    let row_bytes = frame.row_bytes();
    let stride = frame.stride as usize;
    let mut pixels = Vec::with_capacity(row_bytes * frame.height as usize);
    for row in 0..frame.height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&frame.data[start..start + row_bytes]);
    }

    if frame.format == PixelFormat::Bgra8 {
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }

    RgbaImage::from_raw(frame.width, frame.height, pixels).ok_or_else(|| {
        CaptureError::CompositionFailed("pixel buffer size mismatch".to_string())
    })
}
