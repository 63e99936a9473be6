// SPDX-License-Identifier: GPL-3.0-only

//! Dual-camera still compositing
//!
//! A composite request snapshots the front and back slots at the moment of
//! the call, then merges the two frames on a worker thread with the slot
//! locks already released. The completion runs exactly once: with the
//! merged image, with `NoFrameAvailable` when a slot was empty, or with
//! `SessionStopped` when the session went away first.

use super::capture::frame_to_oriented_rgba;
use super::encoding::{EncodedImage, PhotoEncoder};
use crate::backends::camera::types::{Frame, SharedFrame};
use crate::constants::pip;
use crate::errors::{CaptureError, CaptureResult};
use crate::session::FrameSlot;
use crate::session::queue::SessionQueue;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Corner of the back image the front image is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipCorner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Placement of the front image over the back image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipLayout {
    pub corner: PipCorner,
    /// Overlay width as a fraction of the back image width
    pub width_fraction: f32,
    /// Distance from the image edges in pixels
    pub padding: u32,
    /// Flip the front image horizontally before placing it
    pub mirror_front: bool,
}

impl Default for PipLayout {
    fn default() -> Self {
        Self {
            corner: PipCorner::TopRight,
            width_fraction: pip::WIDTH_FRACTION,
            padding: pip::PADDING,
            mirror_front: false,
        }
    }
}

/// Pixel rectangle inside the composite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PipLayout {
    pub fn sanitized(mut self) -> Self {
        if !self.width_fraction.is_finite() {
            self.width_fraction = pip::WIDTH_FRACTION;
        }
        self.width_fraction = self.width_fraction.clamp(0.05, 1.0);
        self.padding = self.padding.min(pip::MAX_PADDING);
        self
    }

    /// Where an overlay of `overlay` size lands on a `base` sized image.
    ///
    /// The overlay keeps its aspect ratio; when the fraction would make it
    /// taller than the padded base it is shrunk to fit. `None` when the base
    /// is too small to hold any overlay.
    pub fn overlay_rect(&self, base: (u32, u32), overlay: (u32, u32)) -> Option<OverlayRect> {
        let (bw, bh) = base;
        let (ow, oh) = overlay;
        if ow == 0 || oh == 0 {
            return None;
        }
        let margins = self.padding.checked_mul(2)?;
        let avail_w = bw.checked_sub(margins)?;
        let avail_h = bh.checked_sub(margins)?;

        let mut width = ((bw as f32 * self.width_fraction).round() as u32).min(avail_w);
        let mut height = (oh as u64 * width as u64 / ow as u64) as u32;
        if height > avail_h {
            height = avail_h;
            width = (ow as u64 * height as u64 / oh as u64) as u32;
        }
        if width == 0 || height == 0 {
            return None;
        }

        let right = bw - width - self.padding;
        let bottom = bh - height - self.padding;
        let (x, y) = match self.corner {
            PipCorner::TopLeft => (self.padding, self.padding),
            PipCorner::TopRight => (right, self.padding),
            PipCorner::BottomLeft => (self.padding, bottom),
            PipCorner::BottomRight => (right, bottom),
        };
        Some(OverlayRect {
            x,
            y,
            width,
            height,
        })
    }
}

/// Merge `front` over `back` according to `layout`.
///
/// Both frames are rotated upright first. `Frame::mirrored` is not consulted:
/// the only flip applied is `layout.mirror_front`, after rotation.
pub fn compose(front: &Frame, back: &Frame, layout: &PipLayout) -> CaptureResult<RgbaImage> {
    let mut base = frame_to_oriented_rgba(back)?;
    let mut overlay = frame_to_oriented_rgba(front)?;
    if layout.mirror_front {
        imageops::flip_horizontal_in_place(&mut overlay);
    }

    let rect = layout
        .overlay_rect(base.dimensions(), overlay.dimensions())
        .ok_or_else(|| {
            CaptureError::CompositionFailed(format!(
                "{}x{} back image too small for overlay",
                base.width(),
                base.height()
            ))
        })?;

    let scaled = if (rect.width, rect.height) == overlay.dimensions() {
        overlay
    } else {
        imageops::resize(&overlay, rect.width, rect.height, FilterType::Triangle)
    };
    imageops::overlay(&mut base, &scaled, rect.x as i64, rect.y as i64);
    Ok(base)
}

/// Result of a dual capture
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub image: RgbaImage,
    pub front_sequence: u64,
    pub back_sequence: u64,
    pub front_timestamp_ns: u64,
    pub back_timestamp_ns: u64,
}

impl CompositeImage {
    pub fn encode(&self, encoder: &PhotoEncoder) -> CaptureResult<EncodedImage> {
        encoder.encode(&self.image)
    }
}

/// Callback receiving the outcome of one composite request
pub type CompositeCompletion = Box<dyn FnOnce(CaptureResult<CompositeImage>) + Send + 'static>;

/// A pending composite; its completion can fire only once
pub struct CompositeRequest {
    id: Uuid,
    created_at: Instant,
    completion: Mutex<Option<CompositeCompletion>>,
}

impl CompositeRequest {
    fn new(completion: CompositeCompletion) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Instant::now(),
            completion: Mutex::new(Some(completion)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Fire the completion unless it already fired
    fn resolve(&self, result: CaptureResult<CompositeImage>) -> bool {
        let completion = self
            .completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match completion {
            Some(completion) => {
                debug!(
                    id = %self.id,
                    ok = result.is_ok(),
                    elapsed_ms = self.created_at.elapsed().as_millis() as u64,
                    "Composite request resolved"
                );
                completion(result);
                true
            }
            None => false,
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<Uuid, Arc<CompositeRequest>>>>;

/// Merges the latest front and back frames into one still image
pub struct Compositor {
    layout: Arc<RwLock<PipLayout>>,
    pending: PendingMap,
    worker: SessionQueue,
}

impl Compositor {
    pub fn new(layout: PipLayout) -> std::io::Result<Self> {
        Ok(Self {
            layout: Arc::new(RwLock::new(layout.sanitized())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            worker: SessionQueue::new(pip::WORKER_NAME)?,
        })
    }

    pub fn layout(&self) -> PipLayout {
        *self.layout.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_layout(&self, layout: PipLayout) {
        *self.layout.write().unwrap_or_else(|e| e.into_inner()) = layout.sanitized();
    }

    /// Requests whose completion has not fired yet
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot both slots and composite them off the calling thread.
    ///
    /// Returns the request id, or `None` when the request failed
    /// immediately (its completion has then already run).
    pub fn capture_dual<F>(&self, front: &FrameSlot, back: &FrameSlot, completion: F) -> Option<Uuid>
    where
        F: FnOnce(CaptureResult<CompositeImage>) + Send + 'static,
    {
        let (front_frame, back_frame) = match (front.peek(), back.peek()) {
            (Some(f), Some(b)) => (f, b),
            (f, b) => {
                warn!(
                    front = f.is_some(),
                    back = b.is_some(),
                    "Dual capture without frames in both slots"
                );
                completion(Err(CaptureError::NoFrameAvailable));
                return None;
            }
        };

        let request = Arc::new(CompositeRequest::new(Box::new(completion)));
        let id = request.id();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&request));

        let layout = self.layout();
        let pending = Arc::clone(&self.pending);
        let job_request = Arc::clone(&request);
        let dispatched = self.worker.dispatch(move || {
            let result = composite_frames(&front_frame, &back_frame, &layout);
            pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&job_request.id());
            job_request.resolve(result);
        });

        if dispatched.is_err() {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            request.resolve(Err(CaptureError::SessionStopped));
            return None;
        }

        info!(%id, "Dual capture requested");
        Some(id)
    }

    /// Future flavour of [`capture_dual`](Self::capture_dual)
    pub async fn capture_dual_async(
        &self,
        front: &FrameSlot,
        back: &FrameSlot,
    ) -> CaptureResult<CompositeImage> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.capture_dual(front, back, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(CaptureError::SessionStopped))
    }

    /// Fail every in-flight request with `error`
    pub fn fail_pending(&self, error: CaptureError) -> usize {
        self.pending_requests().fail_all(error)
    }

    /// Handle for failing in-flight requests from outside the compositor
    pub fn pending_requests(&self) -> PendingRequests {
        PendingRequests(Arc::clone(&self.pending))
    }
}

/// In-flight composite requests shared with the session that owns them
#[derive(Clone)]
pub struct PendingRequests(PendingMap);

impl PendingRequests {
    /// Fail every in-flight request with `error`
    pub fn fail_all(&self, error: CaptureError) -> usize {
        let drained: Vec<_> = self
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, request)| request)
            .collect();

        let failed = drained
            .iter()
            .filter(|request| request.resolve(Err(error.clone())))
            .count();
        if failed > 0 {
            warn!(failed, %error, "Failed pending composite requests");
        }
        failed
    }
}

fn composite_frames(
    front: &SharedFrame,
    back: &SharedFrame,
    layout: &PipLayout,
) -> CaptureResult<CompositeImage> {
    let image = compose(front, back, layout)?;
    Ok(CompositeImage {
        image,
        front_sequence: front.sequence,
        back_sequence: back.sequence,
        front_timestamp_ns: front.timestamp_ns,
        back_timestamp_ns: back.timestamp_ns,
    })
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.fail_pending(CaptureError::SessionStopped);
    }
}
