// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera backend
//!
//! Provides front, back and ultra-wide devices that produce solid BGRA test
//! frames, either paced on a capture thread or emitted on demand. The backend
//! also lets callers inject the failures real hardware produces: devices held
//! by another client, rejected attachments, start failures and interruptions.
//!
//! Frame buffers are scaled down from the negotiated resolution so that a
//! 4K preset does not allocate 4K buffers; the negotiated resolution is still
//! what the stream reports.

use super::buffer_pool::BufferPool;
use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use super::{CameraBackend, CaptureStream, StreamRequest};
use crate::constants::{timing, virtual_camera as defaults};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How virtual streams produce frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Paced capture thread at the given rate
    Continuous { fps: u32 },
    /// Frames only appear through [`VirtualBackend::emit_frame`]
    Manual,
}

/// Base BGRA colour for each synthetic camera
pub fn position_color(position: CameraPosition) -> [u8; 4] {
    match position {
        CameraPosition::Back => [220, 0, 30, 255],
        CameraPosition::Front => [30, 0, 220, 255],
        CameraPosition::UltraWide => [30, 200, 30, 255],
    }
}

/// Device list the virtual backend exposes by default
pub fn default_devices() -> Vec<CameraDevice> {
    vec![
        CameraDevice {
            id: "virtual:back".to_string(),
            name: "Virtual Back Camera".to_string(),
            position: CameraPosition::Back,
            capabilities: DeviceCapabilities {
                has_flash: true,
                has_torch: true,
                has_ultra_wide: true,
            },
            presets: vec![
                Resolution::new(640, 480),
                Resolution::new(1280, 720),
                Resolution::new(1440, 1080),
                Resolution::new(1920, 1080),
                Resolution::new(3840, 2160),
                Resolution::new(4032, 3024),
            ],
            default_preset: Resolution::new(1920, 1080),
        },
        CameraDevice {
            id: "virtual:front".to_string(),
            name: "Virtual Front Camera".to_string(),
            position: CameraPosition::Front,
            capabilities: DeviceCapabilities::default(),
            presets: vec![
                Resolution::new(640, 480),
                Resolution::new(1280, 720),
                Resolution::new(1920, 1080),
                Resolution::new(3088, 2316),
            ],
            default_preset: Resolution::new(1280, 720),
        },
        CameraDevice {
            id: "virtual:ultra-wide".to_string(),
            name: "Virtual Ultra Wide Camera".to_string(),
            position: CameraPosition::UltraWide,
            capabilities: DeviceCapabilities {
                has_flash: false,
                has_torch: false,
                has_ultra_wide: true,
            },
            presets: vec![
                Resolution::new(1280, 720),
                Resolution::new(1920, 1080),
                Resolution::new(4032, 3024),
            ],
            default_preset: Resolution::new(1920, 1080),
        },
    ]
}

/// Builder for [`VirtualBackend`]
pub struct VirtualBackendBuilder {
    devices: Vec<CameraDevice>,
    multi_cam: bool,
    frame_mode: FrameMode,
    max_frame_width: u32,
}

impl VirtualBackendBuilder {
    pub fn multi_cam(mut self, supported: bool) -> Self {
        self.multi_cam = supported;
        self
    }

    pub fn frame_mode(mut self, mode: FrameMode) -> Self {
        self.frame_mode = mode;
        self
    }

    /// Remove the device at `position` from enumeration
    pub fn without_position(mut self, position: CameraPosition) -> Self {
        self.devices.retain(|d| d.position != position);
        self
    }

    pub fn devices(mut self, devices: Vec<CameraDevice>) -> Self {
        self.devices = devices;
        self
    }

    /// Upper bound for the width of produced frame buffers
    pub fn max_frame_width(mut self, width: u32) -> Self {
        self.max_frame_width = width.max(1);
        self
    }

    pub fn build(self) -> VirtualBackend {
        info!(
            devices = self.devices.len(),
            multi_cam = self.multi_cam,
            mode = ?self.frame_mode,
            "Creating virtual camera backend"
        );
        VirtualBackend {
            inner: Arc::new(Inner {
                devices: self.devices,
                multi_cam: self.multi_cam,
                frame_mode: self.frame_mode,
                max_frame_width: self.max_frame_width,
                state: Mutex::new(VirtualState::default()),
            }),
        }
    }
}

/// Synthetic camera backend with failure injection
#[derive(Clone)]
pub struct VirtualBackend {
    inner: Arc<Inner>,
}

struct Inner {
    devices: Vec<CameraDevice>,
    multi_cam: bool,
    frame_mode: FrameMode,
    max_frame_width: u32,
    state: Mutex<VirtualState>,
}

#[derive(Default)]
struct VirtualState {
    in_use: HashSet<String>,
    busy: HashSet<CameraPosition>,
    reject_attach: HashSet<CameraPosition>,
    fail_start: HashSet<CameraPosition>,
    streams: Vec<Weak<StreamShared>>,
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live_streams(&self) -> Vec<Arc<StreamShared>> {
        let mut state = self.lock();
        state.streams.retain(|w| w.strong_count() > 0);
        state.streams.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl VirtualBackend {
    pub fn builder() -> VirtualBackendBuilder {
        VirtualBackendBuilder {
            devices: default_devices(),
            multi_cam: true,
            frame_mode: FrameMode::Continuous {
                fps: defaults::FPS,
            },
            max_frame_width: defaults::MAX_FRAME_WIDTH,
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the camera at `position` as held by another client
    pub fn set_busy(&self, position: CameraPosition, busy: bool) {
        toggle(&mut self.inner.lock().busy, position, busy);
    }

    /// Make the session refuse to add the camera at `position`
    pub fn set_reject_attach(&self, position: CameraPosition, reject: bool) {
        toggle(&mut self.inner.lock().reject_attach, position, reject);
    }

    /// Make streams for `position` fail when started
    pub fn set_fail_start(&self, position: CameraPosition, fail: bool) {
        toggle(&mut self.inner.lock().fail_start, position, fail);
    }

    /// Whether a stream for `position` is currently attached
    pub fn is_attached(&self, position: CameraPosition) -> bool {
        let state = self.inner.lock();
        self.inner
            .devices
            .iter()
            .any(|d| d.position == position && state.in_use.contains(&d.id))
    }

    pub fn attached_count(&self) -> usize {
        self.inner.lock().in_use.len()
    }

    /// Produce one frame on every running stream for `position`.
    ///
    /// Runs the frame callback on the calling thread. Returns whether a frame
    /// was delivered.
    pub fn emit_frame(&self, position: CameraPosition) -> bool {
        self.inner
            .live_streams()
            .iter()
            .filter(|s| s.device.position == position)
            .fold(false, |delivered, s| s.produce() || delivered)
    }

    /// Take the running streams away as the platform would
    pub fn interrupt(&self, reason: InterruptionReason) {
        warn!(%reason, "Virtual backend interruption");
        for stream in self.inner.live_streams() {
            stream.running.store(false, Ordering::Release);
            stream.notify(SessionEvent::Interrupted(reason));
        }
    }

    pub fn end_interruption(&self) {
        for stream in self.inner.live_streams() {
            stream.notify(SessionEvent::InterruptionEnded);
        }
    }

    /// Frames a stream for `position` dropped because its pool was empty
    pub fn dropped_frames(&self, position: CameraPosition) -> u64 {
        self.inner
            .live_streams()
            .iter()
            .filter(|s| s.device.position == position)
            .map(|s| s.pool.exhausted_count())
            .sum()
    }
}

fn toggle(set: &mut HashSet<CameraPosition>, position: CameraPosition, on: bool) {
    if on {
        set.insert(position);
    } else {
        set.remove(&position);
    }
}

impl CameraBackend for VirtualBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.inner.devices.clone()
    }

    fn supports_multi_cam(&self) -> bool {
        self.inner.multi_cam
    }

    fn attach(&self, request: StreamRequest) -> BackendResult<Box<dyn CaptureStream>> {
        let device = self
            .inner
            .devices
            .iter()
            .find(|d| d.id == request.device.id)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(request.device.id.clone()))?;

        if request.resolution != device.default_preset
            && !device.presets.contains(&request.resolution)
        {
            return Err(BackendError::AttachRejected(format!(
                "{} does not offer {}",
                device.name, request.resolution
            )));
        }

        let mut state = self.inner.lock();
        if state.busy.contains(&device.position) || state.in_use.contains(&device.id) {
            return Err(BackendError::DeviceBusy(device.name.clone()));
        }
        if state.reject_attach.contains(&device.position) {
            return Err(BackendError::AttachRejected(format!(
                "session cannot add {}",
                device.name
            )));
        }
        if !self.inner.multi_cam && !state.in_use.is_empty() {
            return Err(BackendError::AttachRejected(
                "multiple camera inputs not supported".to_string(),
            ));
        }

        let frame_size = scaled_frame_size(request.resolution, self.inner.max_frame_width);
        let stride = align_stride(frame_size.width);
        let shared = Arc::new(StreamShared {
            pool: BufferPool::with_capacity(
                request.pool_depth,
                stride as usize * frame_size.height as usize,
            ),
            device: device.clone(),
            resolution: request.resolution,
            frame_size,
            stride,
            mirrored: request.mirrored,
            orientation: AtomicU8::new(request.orientation.to_code()),
            running: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            epoch: Instant::now(),
            delivery: Mutex::new(()),
            on_frame: request.on_frame,
            on_event: request.on_event,
        });

        state.in_use.insert(device.id.clone());
        state.streams.push(Arc::downgrade(&shared));
        drop(state);

        debug!(
            device = %device.name,
            resolution = %request.resolution,
            buffer = %frame_size,
            "Virtual stream attached"
        );

        Ok(Box::new(VirtualStream {
            shared,
            backend: Arc::downgrade(&self.inner),
            mode: self.inner.frame_mode,
            controller: None,
        }))
    }

    fn detach(&self, mut stream: Box<dyn CaptureStream>) {
        stream.stop();
        let id = stream.device().id.clone();
        let mut state = self.inner.lock();
        state.in_use.remove(&id);
        state.streams.retain(|w| w.strong_count() > 0);
        debug!(device = %id, "Virtual stream detached");
    }
}

/// Shrink `resolution` by an integer factor until it fits `max_width`
fn scaled_frame_size(resolution: Resolution, max_width: u32) -> Resolution {
    let factor = resolution.width.div_ceil(max_width).max(1);
    Resolution::new(
        (resolution.width / factor).max(1),
        (resolution.height / factor).max(1),
    )
}

/// Rows are padded to 64 bytes like most hardware buffers
fn align_stride(width: u32) -> u32 {
    (width * 4).next_multiple_of(64)
}

struct StreamShared {
    device: CameraDevice,
    resolution: Resolution,
    frame_size: Resolution,
    stride: u32,
    mirrored: bool,
    orientation: AtomicU8,
    running: AtomicBool,
    sequence: AtomicU64,
    epoch: Instant,
    pool: BufferPool,
    /// Held while a frame is being delivered so `stop` can wait it out
    delivery: Mutex<()>,
    on_frame: FrameCallback,
    on_event: Option<EventCallback>,
}

impl StreamShared {
    fn produce(&self) -> bool {
        let _delivering = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        if !self.running.load(Ordering::Acquire) {
            return false;
        }

        let Some(mut lease) = self.pool.try_lease() else {
            trace!(device = %self.device.name, "Buffer pool exhausted, dropping frame");
            return false;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        let width = self.frame_size.width as usize;
        let mut color = position_color(self.device.position);
        color[1] = color[1].wrapping_add((sequence % 64) as u8);

        let stride = self.stride as usize;
        let buf = lease.as_mut_slice();
        for row in buf.chunks_exact_mut(stride) {
            let (pixels, padding) = row.split_at_mut(width * 4);
            for px in pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&color);
            }
            padding.fill(0);
        }

        let frame = Frame {
            width: self.frame_size.width,
            height: self.frame_size.height,
            format: PixelFormat::Bgra8,
            stride: self.stride,
            data: FrameData::Pooled(lease),
            position: self.device.position,
            sequence,
            timestamp_ns: self.epoch.elapsed().as_nanos() as u64,
            captured_at: Instant::now(),
            orientation: VideoOrientation::from_code(self.orientation.load(Ordering::Acquire)),
            mirrored: self.mirrored,
        };

        if sequence % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(device = %self.device.name, sequence, "Virtual frame produced");
        }
        (self.on_frame)(frame);
        true
    }

    fn notify(&self, event: SessionEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}

struct VirtualStream {
    shared: Arc<StreamShared>,
    backend: Weak<Inner>,
    mode: FrameMode,
    controller: Option<CaptureLoopController>,
}

impl CaptureStream for VirtualStream {
    fn device(&self) -> &CameraDevice {
        &self.shared.device
    }

    fn resolution(&self) -> Resolution {
        self.shared.resolution
    }

    fn start(&mut self) -> BackendResult<()> {
        if self.is_running() {
            return Ok(());
        }
        if let Some(inner) = self.backend.upgrade()
            && inner.lock().fail_start.contains(&self.shared.device.position)
        {
            return Err(BackendError::StreamFailed(format!(
                "{} refused to start",
                self.shared.device.name
            )));
        }

        self.shared.running.store(true, Ordering::Release);

        if let FrameMode::Continuous { fps } = self.mode {
            let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
            let shared = Arc::clone(&self.shared);
            let name = format!("capture-{}", self.shared.device.position);
            let controller = CaptureLoopController::start(&name, interval, move || {
                shared.produce();
                LoopAction::Continue
            })
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                BackendError::StreamFailed(e.to_string())
            })?;
            self.controller = Some(controller);
        }

        info!(device = %self.shared.device.name, "Virtual stream started");
        Ok(())
    }

    fn stop(&mut self) {
        let was_running = self.shared.running.swap(false, Ordering::AcqRel);
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
        }
        // Wait out a frame being emitted from another thread
        drop(self.shared.delivery.lock().unwrap_or_else(|e| e.into_inner()));
        if was_running {
            info!(device = %self.shared.device.name, "Virtual stream stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn set_orientation(&self, orientation: VideoOrientation) {
        self.shared
            .orientation
            .store(orientation.to_code(), Ordering::Release);
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.stop();
        if let Some(inner) = self.backend.upgrade() {
            inner.lock().in_use.remove(&self.shared.device.id);
        }
    }
}
