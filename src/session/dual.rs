// SPDX-License-Identifier: GPL-3.0-only

//! Simultaneous front and back capture
//!
//! Both cameras hang off one session, each with its own frame slot. A dual
//! capture snapshots both slots and hands them to the [`Compositor`]; the
//! picture-in-picture image arrives through a completion.
//!
//! Setup attaches the back camera first, then the front one, inside a single
//! configuration transaction: either both end up attached or neither does.

use super::coordinator::{SessionOptions, stream_request};
use super::frame_slot::FrameSlot;
use super::queue::SessionQueue;
use super::resolution::{ResolutionRequest, negotiate_resolution};
use crate::backends::camera::{
    AspectPolicy, CameraBackend, CameraDevice, CameraPosition, CaptureStream,
    ConfigurationTransaction, EventCallback, Frame, FrameCallback, SessionEvent, SessionState,
    VideoOrientation, find_device,
};
use crate::constants::session;
use crate::errors::{
    AppResult, CaptureError, CaptureResult, ConfigError, ConfigResult, RecordingError,
    SessionError, SessionResult,
};
use crate::pipelines::photo::{CompositeImage, Compositor, PendingRequests, PipLayout};
use crate::pipelines::video::{
    RecordingController, RecordingSink, RecordingSummary, SharedRecordingSender, forward_frame,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct DualState {
    back: Option<Box<dyn CaptureStream>>,
    front: Option<Box<dyn CaptureStream>>,
    request: ResolutionRequest,
    orientation: VideoOrientation,
    last_error: Option<SessionError>,
}

struct DualShared {
    backend: Arc<dyn CameraBackend>,
    devices: Vec<CameraDevice>,
    options: SessionOptions,
    inner: Mutex<DualState>,
    front_slot: Arc<FrameSlot>,
    back_slot: Arc<FrameSlot>,
    recording: RecordingController,
    pending: PendingRequests,
    state_tx: watch::Sender<SessionState>,
}

fn slot_callback(slot: &Arc<FrameSlot>, recording: Option<SharedRecordingSender>) -> FrameCallback {
    let slot = Arc::clone(slot);
    Arc::new(move |frame: Frame| {
        if let Some(recording) = &recording {
            forward_frame(recording, &frame);
        }
        slot.publish(frame);
    })
}

impl DualShared {
    fn lock(&self) -> MutexGuard<'_, DualState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Dual session state changed");
        }
    }

    fn event_callback(self: &Arc<Self>) -> EventCallback {
        let weak: Weak<DualShared> = Arc::downgrade(self);
        Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(event);
            }
        })
    }

    fn clear_slots(&self) {
        self.front_slot.clear();
        self.back_slot.clear();
    }

    fn setup(self: &Arc<Self>) -> ConfigResult<()> {
        let mut inner = self.lock();
        let state = self.state();
        if matches!(state, SessionState::Running | SessionState::Stopping) {
            return Err(ConfigError::InvalidState(state));
        }
        if inner.back.is_some() && inner.front.is_some() {
            debug!("Dual session already configured");
            return Ok(());
        }
        if !self.backend.supports_multi_cam() {
            warn!("Backend cannot run front and back cameras together");
            return Err(ConfigError::MultiCamUnsupported);
        }

        let back = find_device(&self.devices, CameraPosition::Back)
            .ok_or(ConfigError::DeviceUnavailable(CameraPosition::Back))?;
        let front = find_device(&self.devices, CameraPosition::Front)
            .ok_or(ConfigError::DeviceUnavailable(CameraPosition::Front))?;
        let back_resolution = negotiate_resolution(back, inner.request)?;
        let front_resolution = negotiate_resolution(front, inner.request)?;

        self.set_state(SessionState::Configuring);

        let back_request = stream_request(
            back,
            back_resolution,
            inner.orientation,
            &self.options,
            slot_callback(&self.back_slot, Some(self.recording.sender())),
            self.event_callback(),
        );
        let front_request = stream_request(
            front,
            front_resolution,
            inner.orientation,
            &self.options,
            slot_callback(&self.front_slot, None),
            self.event_callback(),
        );

        let mut txn = ConfigurationTransaction::begin(self.backend.as_ref(), "dual_setup");
        let attached = txn
            .attach(back_request)
            .and_then(|_| txn.attach(front_request));
        if let Err(e) = attached {
            drop(txn);
            self.set_state(SessionState::Unconfigured);
            return Err(ConfigError::AttachFailed(e.to_string()));
        }

        let mut streams = txn.commit().into_iter();
        inner.back = streams.next();
        inner.front = streams.next();
        self.set_state(SessionState::Configured);
        info!(
            back = %back_resolution,
            front = %front_resolution,
            "Dual session configured"
        );
        Ok(())
    }

    fn start(&self) -> SessionResult<()> {
        let mut inner = self.lock();
        if self.state() == SessionState::Running {
            return Ok(());
        }
        let DualState { back, front, .. } = &mut *inner;
        let (Some(back), Some(front)) = (back.as_mut(), front.as_mut()) else {
            return Err(SessionError::NotConfigured);
        };

        if let Err(e) = back.start() {
            back.stop();
            self.set_state(SessionState::Stopped);
            return Err(SessionError::StartFailed(e.to_string()));
        }
        if let Err(e) = front.start() {
            warn!(error = %e, "Front camera failed to start, stopping back camera");
            front.stop();
            back.stop();
            self.clear_slots();
            self.set_state(SessionState::Stopped);
            return Err(SessionError::StartFailed(e.to_string()));
        }

        inner.last_error = None;
        self.set_state(SessionState::Running);
        Ok(())
    }

    fn stop(&self) {
        let mut inner = self.lock();
        if self.state() != SessionState::Running {
            return;
        }
        self.set_state(SessionState::Stopping);
        let state = &mut *inner;
        for stream in [state.front.as_mut(), state.back.as_mut()].into_iter().flatten() {
            stream.stop();
        }
        self.clear_slots();
        self.set_state(SessionState::Stopped);
    }

    fn teardown(&self) {
        let mut inner = self.lock();
        for stream in [inner.front.take(), inner.back.take()].into_iter().flatten() {
            self.backend.detach(stream);
        }
        self.clear_slots();
        self.set_state(SessionState::Unconfigured);
    }

    fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Interrupted(reason) => {
                {
                    let mut inner = self.lock();
                    // Each stream reports the same interruption
                    if self.state() != SessionState::Running {
                        return;
                    }
                    warn!(%reason, "Dual session interrupted");
                    let state = &mut *inner;
                    for stream in [state.front.as_mut(), state.back.as_mut()]
                        .into_iter()
                        .flatten()
                    {
                        stream.stop();
                    }
                    self.clear_slots();
                    inner.last_error = Some(SessionError::Interrupted(reason));
                    self.set_state(SessionState::Stopped);
                }
                // Completions run without the session lock held
                self.pending.fail_all(CaptureError::SessionStopped);
            }
            SessionEvent::InterruptionEnded => {
                info!("Interruption ended, dual session can be restarted");
            }
            SessionEvent::DeviceAvailabilityChanged { device_id, available } => {
                debug!(device = %device_id, available, "Device availability changed");
            }
        }
    }
}

/// Runs the front and back cameras concurrently and composites stills
pub struct DualCaptureSessionCoordinator {
    shared: Arc<DualShared>,
    compositor: Compositor,
    queue: SessionQueue,
}

impl DualCaptureSessionCoordinator {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        options: SessionOptions,
        layout: PipLayout,
    ) -> AppResult<Self> {
        let devices = backend.enumerate_cameras();
        let (state_tx, _) = watch::channel(SessionState::Unconfigured);
        let compositor = Compositor::new(layout)?;

        Ok(Self {
            shared: Arc::new(DualShared {
                backend,
                devices,
                options,
                inner: Mutex::new(DualState {
                    back: None,
                    front: None,
                    request: ResolutionRequest::new(
                        session::DUAL_TARGET_SIZE,
                        AspectPolicy::Unconstrained,
                    ),
                    orientation: VideoOrientation::Portrait,
                    last_error: None,
                }),
                front_slot: Arc::new(FrameSlot::new(CameraPosition::Front)),
                back_slot: Arc::new(FrameSlot::new(CameraPosition::Back)),
                recording: RecordingController::new(),
                pending: compositor.pending_requests(),
                state_tx,
            }),
            compositor,
            queue: SessionQueue::new(session::DUAL_QUEUE_NAME)?,
        })
    }

    /// Whether the hardware can stream front and back together
    pub fn is_supported(&self) -> bool {
        self.shared.backend.supports_multi_cam()
            && find_device(&self.shared.devices, CameraPosition::Back).is_some()
            && find_device(&self.shared.devices, CameraPosition::Front).is_some()
    }

    /// Resolution used by the next setup
    pub fn set_resolution_request(&self, target_size: u32, aspect: AspectPolicy) {
        self.shared.lock().request = ResolutionRequest::new(target_size, aspect);
    }

    /// Attach both cameras on the session queue; `completion` reports success.
    ///
    /// The failure reason is logged and also returned by
    /// [`setup_blocking`](Self::setup_blocking).
    pub fn setup<F>(&self, completion: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let dispatched = self.queue.dispatch(move || {
            let result = shared.setup();
            if let Err(e) = &result {
                error!(error = %e, "Dual session setup failed");
            }
            completion(result.is_ok());
        });
        if let Err(e) = dispatched {
            error!(error = %e, "Could not queue dual session setup");
        }
    }

    /// Attach both cameras and wait for the outcome
    pub fn setup_blocking(&self) -> ConfigResult<()> {
        let shared = Arc::clone(&self.shared);
        self.queue
            .run_sync(move || shared.setup())
            .unwrap_or_else(|e| Err(ConfigError::AttachFailed(e.to_string())))
    }

    /// Start both cameras; if either fails neither keeps running
    pub fn start(&self) -> SessionResult<()> {
        let shared = Arc::clone(&self.shared);
        self.queue.run_sync(move || shared.start())?
    }

    /// Stop both cameras and fail in-flight composites
    pub fn stop(&self) -> SessionResult<()> {
        let shared = Arc::clone(&self.shared);
        self.queue.run_sync(move || shared.stop())?;
        self.compositor.fail_pending(CaptureError::SessionStopped);
        Ok(())
    }

    /// Composite the latest front and back frames.
    ///
    /// Returns the request id, or `None` when the completion already ran
    /// with an error.
    pub fn capture_dual<F>(&self, completion: F) -> Option<Uuid>
    where
        F: FnOnce(CaptureResult<CompositeImage>) + Send + 'static,
    {
        self.compositor
            .capture_dual(&self.shared.front_slot, &self.shared.back_slot, completion)
    }

    pub async fn capture_dual_async(&self) -> CaptureResult<CompositeImage> {
        self.compositor
            .capture_dual_async(&self.shared.front_slot, &self.shared.back_slot)
            .await
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn front_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.shared.front_slot)
    }

    pub fn back_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.shared.back_slot)
    }

    pub fn update_orientation(&self, orientation: VideoOrientation) {
        let mut inner = self.shared.lock();
        inner.orientation = orientation;
        for stream in [inner.front.as_ref(), inner.back.as_ref()].into_iter().flatten() {
            stream.set_orientation(orientation);
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn take_error(&self) -> Option<SessionError> {
        self.shared.lock().last_error.take()
    }

    /// Record the back camera
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
}

impl Drop for DualCaptureSessionCoordinator {
    fn drop(&mut self) {
        let shared = Arc::clone(&self.shared);
        if self.queue.run_sync(move || shared.teardown()).is_err() {
            self.shared.teardown();
        }
        self.compositor.fail_pending(CaptureError::SessionStopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::InterruptionReason;
    use crate::backends::camera::virtual_backend::{FrameMode, VirtualBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn dual(backend: &VirtualBackend) -> DualCaptureSessionCoordinator {
        DualCaptureSessionCoordinator::new(
            Arc::new(backend.clone()),
            SessionOptions::default(),
            PipLayout::default(),
        )
        .unwrap()
    }

    fn manual() -> VirtualBackend {
        VirtualBackend::builder()
            .frame_mode(FrameMode::Manual)
            .build()
    }

    #[test]
    fn test_setup_attaches_both_cameras() {
        let backend = manual();
        let session = dual(&backend);
        assert!(session.is_supported());
        session.setup_blocking().unwrap();
        assert!(backend.is_attached(CameraPosition::Back));
        assert!(backend.is_attached(CameraPosition::Front));
        assert_eq!(session.state(), SessionState::Configured);
    }

    #[test]
    fn test_setup_completion_reports_result() {
        let backend = VirtualBackend::builder()
            .frame_mode(FrameMode::Manual)
            .multi_cam(false)
            .build();
        let session = dual(&backend);
        assert!(!session.is_supported());

        let (tx, rx) = mpsc::channel();
        session.setup(move |ok| tx.send(ok).unwrap());
        assert!(!rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(
            session.setup_blocking(),
            Err(ConfigError::MultiCamUnsupported)
        );
        assert_eq!(backend.attached_count(), 0);
    }

    #[test]
    fn test_setup_rolls_back_back_camera() {
        let backend = manual();
        backend.set_busy(CameraPosition::Front, true);
        let session = dual(&backend);
        assert!(matches!(
            session.setup_blocking(),
            Err(ConfigError::AttachFailed(_))
        ));
        assert!(!backend.is_attached(CameraPosition::Back));
        assert_eq!(session.state(), SessionState::Unconfigured);
    }

    #[test]
    fn test_start_failure_stops_other_camera() {
        let backend = manual();
        backend.set_fail_start(CameraPosition::Front, true);
        let session = dual(&backend);
        session.setup_blocking().unwrap();

        assert!(matches!(
            session.start(),
            Err(SessionError::StartFailed(_))
        ));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!backend.emit_frame(CameraPosition::Back));
    }

    #[test]
    fn test_capture_dual_after_both_frames() {
        let backend = manual();
        let session = dual(&backend);
        session.setup_blocking().unwrap();
        session.start().unwrap();
        backend.emit_frame(CameraPosition::Back);
        backend.emit_frame(CameraPosition::Front);

        let (tx, rx) = mpsc::channel();
        let id = session.capture_dual(move |result| tx.send(result).unwrap());
        assert!(id.is_some());
        let composite = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(composite.back_sequence, 0);
        assert_eq!(composite.front_sequence, 0);
    }

    #[test]
    fn test_capture_dual_without_back_frame() {
        let backend = manual();
        let session = dual(&backend);
        session.setup_blocking().unwrap();
        session.start().unwrap();
        backend.emit_frame(CameraPosition::Front);

        let (tx, rx) = mpsc::channel();
        assert!(session.capture_dual(move |result| tx.send(result).unwrap()).is_none());
        assert_eq!(
            rx.try_recv().unwrap().unwrap_err(),
            CaptureError::NoFrameAvailable
        );
    }

    /// Occupy the compositor worker with one request, queue a second behind
    /// it, run `end_session` and check the queued one fails exactly once
    fn assert_queued_composite_fails_once<F>(end_session: F)
    where
        F: FnOnce(&VirtualBackend, &DualCaptureSessionCoordinator),
    {
        let backend = manual();
        let session = dual(&backend);
        session.setup_blocking().unwrap();
        session.start().unwrap();
        backend.emit_frame(CameraPosition::Back);
        backend.emit_frame(CameraPosition::Front);

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (first_tx, first_rx) = mpsc::channel();
        let first = session.capture_dual(move |result| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            first_tx.send(result).unwrap();
        });
        assert!(first.is_some());
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let front_copy = FrameSlot::new(CameraPosition::Front);
        front_copy.publish_shared(session.front_slot().peek().unwrap());
        let back_copy = FrameSlot::new(CameraPosition::Back);
        back_copy.publish_shared(session.back_slot().peek().unwrap());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (second_tx, second_rx) = mpsc::channel();
        let second = session.capture_dual(move |result| {
            counter.fetch_add(1, Ordering::SeqCst);
            second_tx.send(result).unwrap();
        });
        assert!(second.is_some());
        assert_eq!(session.compositor().pending_count(), 1);

        end_session(&backend, &session);
        assert_eq!(
            second_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err(),
            CaptureError::SessionStopped
        );
        assert_eq!(session.compositor().pending_count(), 0);

        // The running request still completes normally
        release_tx.send(()).unwrap();
        assert!(first_rx.recv_timeout(Duration::from_secs(5)).unwrap().is_ok());

        // Let the worker reach the failed request's job. The session slots
        // were cleared, so queue behind it from copies of the same frames.
        let (drain_tx, drain_rx) = mpsc::channel();
        session
            .compositor()
            .capture_dual(&front_copy, &back_copy, move |result| {
                drain_tx.send(result.is_ok()).unwrap()
            })
            .unwrap();
        assert!(drain_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_fails_queued_composite_once() {
        assert_queued_composite_fails_once(|_, session| session.stop().unwrap());
    }

    #[test]
    fn test_interruption_fails_queued_composite_once() {
        assert_queued_composite_fails_once(|backend, session| {
            backend.interrupt(InterruptionReason::AnotherClient);
            assert_eq!(session.state(), SessionState::Stopped);
        });
    }

    #[test]
    fn test_interruption_is_handled_once() {
        let backend = manual();
        let session = dual(&backend);
        session.setup_blocking().unwrap();
        session.start().unwrap();
        backend.emit_frame(CameraPosition::Back);

        backend.interrupt(InterruptionReason::Backgrounded);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.back_slot().is_empty());
        assert_eq!(
            session.take_error(),
            Some(SessionError::Interrupted(InterruptionReason::Backgrounded))
        );
        assert_eq!(session.take_error(), None);
    }

    #[test]
    fn test_drop_detaches_everything() {
        let backend = manual();
        {
            let session = dual(&backend);
            session.setup_blocking().unwrap();
            session.start().unwrap();
        }
        assert_eq!(backend.attached_count(), 0);
    }
}
