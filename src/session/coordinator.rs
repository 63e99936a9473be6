// SPDX-License-Identifier: GPL-3.0-only

//! Single-camera capture session
//!
//! The coordinator owns one attached camera and the frame slot its capture
//! callback writes into. Every topology change (configure, switch) and every
//! start/stop runs on the session queue; the caller blocks until the
//! hardware work is done. Failed changes restore the previous camera so the
//! session is never left without one.

use super::frame_slot::FrameSlot;
use super::queue::SessionQueue;
use super::resolution::{ResolutionRequest, negotiate_resolution};
use crate::backends::camera::{
    AspectPolicy, CameraBackend, CameraDevice, CameraPosition, CaptureStream,
    ConfigurationTransaction, DeviceOrientation, EventCallback, Frame, FrameCallback, Resolution,
    SessionEvent, SessionState, SharedFrame, StreamRequest, VideoOrientation, find_device,
};
use crate::config::Config;
use crate::constants::{recording, session};
use crate::errors::{
    AppResult, CaptureResult, ConfigError, ConfigResult, RecordingError, SessionError,
    SessionResult,
};
use crate::pipelines::photo::PhotoCapture;
use crate::pipelines::video::{RecordingController, RecordingSink, RecordingSummary, forward_frame};
use image::RgbaImage;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Tunables shared by the single and dual coordinators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Frame buffers each stream may have in flight
    pub pool_depth: usize,
    /// Mirror the front camera output
    pub mirror_front: bool,
    /// Frames queued between capture thread and recording sink
    pub recording_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pool_depth: session::DEFAULT_POOL_DEPTH,
            mirror_front: true,
            recording_capacity: recording::CHANNEL_CAPACITY,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pool_depth: config.pool_depth,
            mirror_front: config.mirror_front,
            ..Self::default()
        }
    }
}

/// Build the attach request for one camera
pub(crate) fn stream_request(
    device: &CameraDevice,
    resolution: Resolution,
    orientation: VideoOrientation,
    options: &SessionOptions,
    on_frame: FrameCallback,
    on_event: EventCallback,
) -> StreamRequest {
    StreamRequest {
        device: device.clone(),
        resolution,
        orientation,
        mirrored: options.mirror_front && device.position == CameraPosition::Front,
        pool_depth: options.pool_depth,
        on_frame,
        on_event: Some(on_event),
    }
}

struct SingleState {
    active: Option<Box<dyn CaptureStream>>,
    request: Option<ResolutionRequest>,
    orientation: VideoOrientation,
    last_error: Option<SessionError>,
}

struct Shared {
    backend: Arc<dyn CameraBackend>,
    devices: Vec<CameraDevice>,
    options: SessionOptions,
    inner: Mutex<SingleState>,
    slot: Arc<FrameSlot>,
    recording: RecordingController,
    state_tx: watch::Sender<SessionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SingleState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Session state changed");
        }
    }

    fn frame_callback(&self) -> FrameCallback {
        let slot = Arc::clone(&self.slot);
        let recording = self.recording.sender();
        Arc::new(move |frame: Frame| {
            forward_frame(&recording, &frame);
            slot.publish(frame);
        })
    }

    fn request_for(
        self: &Arc<Self>,
        device: &CameraDevice,
        resolution: Resolution,
        orientation: VideoOrientation,
    ) -> StreamRequest {
        let weak: Weak<Shared> = Arc::downgrade(self);
        let on_event: EventCallback = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(event);
            }
        });
        stream_request(
            device,
            resolution,
            orientation,
            &self.options,
            self.frame_callback(),
            on_event,
        )
    }

    fn configure(
        self: &Arc<Self>,
        position: CameraPosition,
        request: ResolutionRequest,
    ) -> ConfigResult<()> {
        let mut inner = self.lock();
        let state = self.state();
        if matches!(state, SessionState::Running | SessionState::Stopping) {
            return Err(ConfigError::InvalidState(state));
        }

        let device = find_device(&self.devices, position)
            .cloned()
            .ok_or(ConfigError::DeviceUnavailable(position))?;
        let resolution = negotiate_resolution(&device, request)?;

        self.set_state(SessionState::Configuring);
        let previous = inner.active.take().map(|stream| {
            let info = (stream.device().clone(), stream.resolution());
            self.backend.detach(stream);
            info
        });

        let mut txn = ConfigurationTransaction::begin(self.backend.as_ref(), "configure");
        let attached = txn.attach(self.request_for(&device, resolution, inner.orientation));
        match attached {
            Ok(_) => {
                inner.active = txn.commit().pop();
                inner.request = Some(request);
                self.slot.clear();
                self.set_state(SessionState::Configured);
                info!(device = %device.name, %resolution, "Session configured");
                Ok(())
            }
            Err(e) => {
                drop(txn);
                self.restore(&mut inner, previous, false);
                Err(ConfigError::AttachFailed(e.to_string()))
            }
        }
    }

    fn switch_camera(self: &Arc<Self>, position: CameraPosition) -> ConfigResult<()> {
        let mut inner = self.lock();
        let state = self.state();
        let current_position = match inner.active.as_ref() {
            Some(stream) => stream.device().position,
            None => return Err(ConfigError::InvalidState(state)),
        };
        if current_position == position {
            debug!(%position, "Already on requested camera");
            return Ok(());
        }

        let device = find_device(&self.devices, position)
            .cloned()
            .ok_or(ConfigError::DeviceUnavailable(position))?;
        let request = inner.request.unwrap_or(ResolutionRequest::new(
            session::DEFAULT_TARGET_SIZE,
            AspectPolicy::Unconstrained,
        ));
        let resolution = negotiate_resolution(&device, request)?;

        let was_running = state == SessionState::Running;
        self.set_state(SessionState::Configuring);

        let previous = inner.active.take().map(|stream| {
            let info = (stream.device().clone(), stream.resolution());
            self.backend.detach(stream);
            info
        });

        let mut txn = ConfigurationTransaction::begin(self.backend.as_ref(), "switch_camera");
        if let Err(e) = txn.attach(self.request_for(&device, resolution, inner.orientation)) {
            drop(txn);
            self.restore(&mut inner, previous, was_running);
            return Err(ConfigError::AttachFailed(e.to_string()));
        }

        let Some(mut stream) = txn.commit().pop() else {
            self.restore(&mut inner, previous, was_running);
            return Err(ConfigError::AttachFailed("no stream attached".to_string()));
        };

        if was_running && let Err(e) = stream.start() {
            warn!(device = %device.name, error = %e, "New camera failed to start");
            self.backend.detach(stream);
            self.restore(&mut inner, previous, was_running);
            return Err(ConfigError::AttachFailed(e.to_string()));
        }

        inner.active = Some(stream);
        self.slot.clear();
        self.set_state(if was_running {
            SessionState::Running
        } else {
            SessionState::Configured
        });
        info!(from = %current_position, to = %position, %resolution, "Switched camera");
        Ok(())
    }

    /// Re-attach the camera that was active before a failed change
    fn restore(
        self: &Arc<Self>,
        inner: &mut SingleState,
        previous: Option<(CameraDevice, Resolution)>,
        restart: bool,
    ) {
        let Some((device, resolution)) = previous else {
            self.set_state(SessionState::Unconfigured);
            return;
        };

        match self
            .backend
            .attach(self.request_for(&device, resolution, inner.orientation))
        {
            Ok(mut stream) => {
                if restart && let Err(e) = stream.start() {
                    error!(device = %device.name, error = %e, "Restored camera failed to restart");
                    inner.active = Some(stream);
                    self.set_state(SessionState::Stopped);
                    return;
                }
                inner.active = Some(stream);
                self.set_state(if restart {
                    SessionState::Running
                } else {
                    SessionState::Configured
                });
                info!(device = %device.name, "Restored previous camera");
            }
            Err(e) => {
                error!(device = %device.name, error = %e, "Could not restore previous camera");
                inner.request = None;
                self.set_state(SessionState::Unconfigured);
            }
        }
    }

    fn start(&self) -> SessionResult<()> {
        let mut inner = self.lock();
        if self.state() == SessionState::Running {
            return Ok(());
        }
        let Some(stream) = inner.active.as_mut() else {
            return Err(SessionError::NotConfigured);
        };

        match stream.start() {
            Ok(()) => {
                inner.last_error = None;
                self.set_state(SessionState::Running);
                Ok(())
            }
            Err(e) => {
                stream.stop();
                self.set_state(SessionState::Stopped);
                Err(SessionError::StartFailed(e.to_string()))
            }
        }
    }

    fn stop(&self) {
        let mut inner = self.lock();
        if self.state() != SessionState::Running {
            return;
        }
        self.set_state(SessionState::Stopping);
        if let Some(stream) = inner.active.as_mut() {
            stream.stop();
        }
        self.slot.clear();
        self.set_state(SessionState::Stopped);
    }

    fn teardown(&self) {
        let mut inner = self.lock();
        if let Some(mut stream) = inner.active.take() {
            stream.stop();
            self.backend.detach(stream);
        }
        self.slot.clear();
        self.set_state(SessionState::Unconfigured);
    }

    fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Interrupted(reason) => {
                let mut inner = self.lock();
                if self.state() != SessionState::Running {
                    return;
                }
                warn!(%reason, "Session interrupted");
                if let Some(stream) = inner.active.as_mut() {
                    stream.stop();
                }
                self.slot.clear();
                inner.last_error = Some(SessionError::Interrupted(reason));
                self.set_state(SessionState::Stopped);
            }
            SessionEvent::InterruptionEnded => {
                info!("Interruption ended, session can be restarted");
            }
            SessionEvent::DeviceAvailabilityChanged { device_id, available } => {
                debug!(device = %device_id, available, "Device availability changed");
            }
        }
    }
}

/// Configures and runs one camera input/output pair
pub struct CaptureSessionCoordinator {
    shared: Arc<Shared>,
    queue: SessionQueue,
}

impl CaptureSessionCoordinator {
    /// Enumerate devices once and set up the session queue
    pub fn new(backend: Arc<dyn CameraBackend>, options: SessionOptions) -> AppResult<Self> {
        let devices = backend.enumerate_cameras();
        info!(cameras = devices.len(), "Creating capture session");
        let (state_tx, _) = watch::channel(SessionState::Unconfigured);

        Ok(Self {
            shared: Arc::new(Shared {
                backend,
                devices,
                options,
                inner: Mutex::new(SingleState {
                    active: None,
                    request: None,
                    orientation: VideoOrientation::Portrait,
                    last_error: None,
                }),
                slot: Arc::new(FrameSlot::new(CameraPosition::Back)),
                recording: RecordingController::new(),
                state_tx,
            }),
            queue: SessionQueue::new(session::SINGLE_QUEUE_NAME)?,
        })
    }

    /// Select the camera at `position` and negotiate its resolution
    pub fn configure(
        &self,
        position: CameraPosition,
        target_size: u32,
        aspect: AspectPolicy,
    ) -> ConfigResult<()> {
        let shared = Arc::clone(&self.shared);
        let request = ResolutionRequest::new(target_size, aspect);
        self.queue
            .run_sync(move || shared.configure(position, request))
            .unwrap_or_else(|e| Err(ConfigError::AttachFailed(e.to_string())))
    }

    /// Begin streaming; a running session is left alone
    pub fn start(&self) -> SessionResult<()> {
        let shared = Arc::clone(&self.shared);
        self.queue.run_sync(move || shared.start())?
    }

    /// End streaming; stopping a session that is not running does nothing
    pub fn stop(&self) -> SessionResult<()> {
        let shared = Arc::clone(&self.shared);
        self.queue.run_sync(move || shared.stop())
    }

    /// Replace the active camera, restoring it if the new one cannot attach
    pub fn switch_camera(&self, position: CameraPosition) -> ConfigResult<()> {
        let shared = Arc::clone(&self.shared);
        self.queue
            .run_sync(move || shared.switch_camera(position))
            .unwrap_or_else(|e| Err(ConfigError::AttachFailed(e.to_string())))
    }

    /// Orientation for frames produced from now on
    pub fn update_orientation(&self, orientation: VideoOrientation) {
        let mut inner = self.shared.lock();
        inner.orientation = orientation;
        if let Some(stream) = inner.active.as_ref() {
            stream.set_orientation(orientation);
        }
        debug!(%orientation, "Orientation updated");
    }

    /// Map a physical device rotation and apply it
    pub fn update_device_orientation(&self, orientation: DeviceOrientation) {
        self.update_orientation(VideoOrientation::from_device(orientation));
    }

    pub fn devices(&self) -> &[CameraDevice] {
        &self.shared.devices
    }

    pub fn has_ultra_wide(&self) -> bool {
        self.shared
            .devices
            .iter()
            .any(|d| d.position == CameraPosition::UltraWide || d.capabilities.has_ultra_wide)
    }

    pub fn has_front_camera(&self) -> bool {
        find_device(&self.shared.devices, CameraPosition::Front).is_some()
    }

    /// Flash on the active camera, or on any camera before configuration
    pub fn has_flash(&self) -> bool {
        match self.shared.lock().active.as_ref() {
            Some(stream) => stream.device().capabilities.has_flash,
            None => self.shared.devices.iter().any(|d| d.capabilities.has_flash),
        }
    }

    pub fn has_torch(&self) -> bool {
        match self.shared.lock().active.as_ref() {
            Some(stream) => stream.device().capabilities.has_torch,
            None => self.shared.devices.iter().any(|d| d.capabilities.has_torch),
        }
    }

    pub fn current_position(&self) -> Option<CameraPosition> {
        self.shared
            .lock()
            .active
            .as_ref()
            .map(|s| s.device().position)
    }

    pub fn current_resolution(&self) -> Option<Resolution> {
        self.shared.lock().active.as_ref().map(|s| s.resolution())
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Last asynchronous failure (interruption), cleared by a successful start
    pub fn take_error(&self) -> Option<SessionError> {
        self.shared.lock().last_error.take()
    }

    /// Slot the capture callback publishes into
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.shared.slot)
    }

    /// Latest frame as a still
    pub fn capture_photo(&self) -> CaptureResult<SharedFrame> {
        PhotoCapture::capture_from_slot(&self.shared.slot)
    }

    /// Latest frame converted to RGBA
    pub fn capture_image(&self) -> CaptureResult<RgbaImage> {
        PhotoCapture::capture_image(&self.shared.slot)
    }

    pub fn start_recording<S: RecordingSink>(
        &self,
        sink: S,
        max_duration: Option<Duration>,
    ) -> Result<(), RecordingError> {
        self.shared
            .recording
            .start(sink, self.shared.options.recording_capacity, max_duration)
    }

    pub fn stop_recording(&self) -> Result<RecordingSummary, RecordingError> {
        self.shared.recording.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.is_recording()
    }
}

impl Drop for CaptureSessionCoordinator {
    fn drop(&mut self) {
        let shared = Arc::clone(&self.shared);
        if self.queue.run_sync(move || shared.teardown()).is_err() {
            self.shared.teardown();
        }
    }
}
