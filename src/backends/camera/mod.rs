// SPDX-License-Identifier: GPL-3.0-only
// Camera backend with trait-based abstraction

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Session coordinators         │  ← single / dual lifecycle, frame slots
//! └──────────────┬───────────────┘
//!                │  ConfigurationTransaction (attach / commit / rollback)
//!                ▼
//! ┌──────────────────────────────┐
//! │ CameraBackend trait          │  ← enumeration, attach, detach
//! └──────────────┬───────────────┘
//!                │
//!                ▼
//!        ┌──────────────┐
//!        │ VirtualBackend│  ← synthetic devices, failure injection
//!        └──────────────┘
//! ```
//!
//! A backend hands out one [`CaptureStream`] per attached device. Frames are
//! delivered on the backend's capture thread through the [`FrameCallback`]
//! given at attach time; session-level notifications go through the
//! optional [`EventCallback`].

pub mod buffer_pool;
pub mod frame_loop;
pub mod types;
pub mod virtual_backend;

pub use buffer_pool::{BufferLease, BufferPool};
pub use types::*;
pub use virtual_backend::VirtualBackend;

use tracing::{debug, info, warn};

/// Everything a backend needs to attach one camera to a session
#[derive(Clone)]
pub struct StreamRequest {
    pub device: CameraDevice,
    pub resolution: Resolution,
    pub orientation: VideoOrientation,
    /// Mirror the output horizontally (front camera preview)
    pub mirrored: bool,
    /// Number of frame buffers the stream may have in flight
    pub pool_depth: usize,
    pub on_frame: FrameCallback,
    pub on_event: Option<EventCallback>,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("device", &self.device.id)
            .field("resolution", &self.resolution)
            .field("orientation", &self.orientation)
            .field("mirrored", &self.mirrored)
            .field("pool_depth", &self.pool_depth)
            .finish()
    }
}

/// An attached camera input with its video data output
///
/// Dropping a stream without handing it back through
/// [`CameraBackend::detach`] stops it but leaves the device marked in use
/// until the backend notices.
pub trait CaptureStream: Send {
    fn device(&self) -> &CameraDevice;

    fn resolution(&self) -> Resolution;

    /// Begin delivering frames
    fn start(&mut self) -> BackendResult<()>;

    /// Stop delivering frames; no callback fires after this returns
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Change the orientation stamped on subsequent frames
    fn set_orientation(&self, orientation: VideoOrientation);
}

/// Platform camera subsystem
pub trait CameraBackend: Send + Sync {
    /// Enumerate available cameras
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Whether two cameras can stream concurrently under one session
    fn supports_multi_cam(&self) -> bool;

    /// Attach a camera input and its output
    fn attach(&self, request: StreamRequest) -> BackendResult<Box<dyn CaptureStream>>;

    /// Stop and release a previously attached stream
    fn detach(&self, stream: Box<dyn CaptureStream>);
}

/// Batched set of attach operations that is all-or-nothing.
///
/// Streams attached through the transaction are detached again when it is
/// dropped without [`commit`](Self::commit), so an error path only has to
/// return early.
pub struct ConfigurationTransaction<'a> {
    backend: &'a dyn CameraBackend,
    attached: Vec<Box<dyn CaptureStream>>,
    label: &'static str,
}

impl<'a> ConfigurationTransaction<'a> {
    pub fn begin(backend: &'a dyn CameraBackend, label: &'static str) -> Self {
        debug!(label, "Begin configuration");
        Self {
            backend,
            attached: Vec::new(),
            label,
        }
    }

    /// Attach one stream; returns its index in the committed list
    pub fn attach(&mut self, request: StreamRequest) -> BackendResult<usize> {
        let device_id = request.device.id.clone();
        let resolution = request.resolution;
        let stream = self.backend.attach(request).inspect_err(|e| {
            warn!(label = self.label, device = %device_id, error = %e, "Attach failed");
        })?;
        debug!(label = self.label, device = %device_id, %resolution, "Attached stream");
        self.attached.push(stream);
        Ok(self.attached.len() - 1)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Keep everything attached so far
    pub fn commit(mut self) -> Vec<Box<dyn CaptureStream>> {
        info!(
            label = self.label,
            streams = self.attached.len(),
            "Commit configuration"
        );
        std::mem::take(&mut self.attached)
    }
}

impl Drop for ConfigurationTransaction<'_> {
    fn drop(&mut self) {
        if self.attached.is_empty() {
            return;
        }
        warn!(
            label = self.label,
            streams = self.attached.len(),
            "Rolling back uncommitted configuration"
        );
        for stream in self.attached.drain(..).rev() {
            self.backend.detach(stream);
        }
    }
}

/// Pick the first enumerated device at `position`
pub fn find_device(devices: &[CameraDevice], position: CameraPosition) -> Option<&CameraDevice> {
    devices.iter().find(|d| d.position == position)
}
