// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for preview rendering and recording on live sessions

use camera_preview::backends::camera::virtual_backend::{FrameMode, position_color};
use camera_preview::backends::camera::{
    AspectPolicy, CameraPosition, Frame, SessionState, VirtualBackend,
};
use camera_preview::pipelines::photo::PipLayout;
use camera_preview::pipelines::video::{ImageSequenceSink, RecordingSink};
use camera_preview::render::{
    DisplayLink, FilterHandle, FilterState, FilterType, RenderPipeline, SoftwareSurface,
    TickOutcome,
};
use camera_preview::session::{
    CaptureSessionCoordinator, DualCaptureSessionCoordinator, SessionOptions,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn manual_backend() -> VirtualBackend {
    VirtualBackend::builder()
        .frame_mode(FrameMode::Manual)
        .build()
}

fn single_session(backend: &VirtualBackend) -> CaptureSessionCoordinator {
    let session =
        CaptureSessionCoordinator::new(Arc::new(backend.clone()), SessionOptions::default())
            .unwrap();
    session
        .configure(CameraPosition::Back, 720, AspectPolicy::Unconstrained)
        .unwrap();
    session
}

/// First emitted frame of `position` as RGBA
fn first_rgba(position: CameraPosition) -> [u8; 4] {
    let [b, g, r, a] = position_color(position);
    [r, g, b, a]
}

#[test]
fn test_pipeline_follows_session_lifecycle() {
    let backend = manual_backend();
    let session = single_session(&backend);
    let mut pipeline = RenderPipeline::single(session.frame_slot(), SoftwareSurface::new(32, 24))
        .observe_session(session.subscribe_state());

    assert_eq!(pipeline.tick(), TickOutcome::Inactive);

    session.start().unwrap();
    assert_eq!(pipeline.tick(), TickOutcome::Unchanged);

    backend.emit_frame(CameraPosition::Back);
    assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 1 });
    assert_eq!(pipeline.surface().pixel(5, 5), first_rgba(CameraPosition::Back));
    assert_eq!(pipeline.cache_len(), 1);

    // Same frame, nothing to redraw
    assert_eq!(pipeline.tick(), TickOutcome::Unchanged);
    assert_eq!(pipeline.surface().presented(), 1);

    session.stop().unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(pipeline.tick(), TickOutcome::Inactive);
    assert_eq!(pipeline.cache_len(), 0);
}

#[test]
fn test_dual_preview_places_front_in_corner() {
    let backend = manual_backend();
    let layout = PipLayout::default();
    let session =
        DualCaptureSessionCoordinator::new(Arc::new(backend.clone()), SessionOptions::default(), layout)
            .unwrap();
    session.setup_blocking().unwrap();
    session.start().unwrap();

    let mut pipeline = RenderPipeline::dual(
        session.back_slot(),
        session.front_slot(),
        layout,
        SoftwareSurface::new(200, 150),
    )
    .observe_session(session.subscribe_state());

    backend.emit_frame(CameraPosition::Back);
    assert_eq!(pipeline.tick(), TickOutcome::Unchanged);

    backend.emit_frame(CameraPosition::Front);
    assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 2 });

    let front = session.front_slot().peek().unwrap();
    let rect = layout
        .overlay_rect((200, 150), (front.width, front.height))
        .unwrap();
    let surface = pipeline.surface();
    assert_eq!(
        surface.pixel(rect.x + rect.width / 2, rect.y + rect.height / 2),
        first_rgba(CameraPosition::Front)
    );
    assert_eq!(surface.pixel(2, 148), first_rgba(CameraPosition::Back));

    let surface = pipeline.deallocate();
    assert_eq!(surface.presented(), 1);
    assert!(session.back_slot().is_empty());
    assert!(session.front_slot().is_empty());
}

#[test]
fn test_display_link_renders_live_frames() {
    let backend = VirtualBackend::builder()
        .frame_mode(FrameMode::Continuous { fps: 120 })
        .build();
    let session = single_session(&backend);
    session.start().unwrap();

    let filter = FilterHandle::new(FilterState::new(FilterType::Negative));
    let pipeline = RenderPipeline::single(session.frame_slot(), SoftwareSurface::new(16, 16))
        .with_filter(filter.clone())
        .observe_session(session.subscribe_state());
    let link = DisplayLink::start(pipeline, 120).unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let pipeline = link.stop().unwrap();
    session.stop().unwrap();
    let stats = pipeline.stats();
    assert!(stats.drawn >= 1);
    assert_eq!(stats.ticks, stats.drawn + stats.unchanged + stats.inactive);

    // Negative inverts the red channel of the back camera colour
    let [_, _, r, _] = position_color(CameraPosition::Back);
    assert_eq!(pipeline.surface().pixel(8, 8)[0], 255 - r);
}

#[derive(Clone, Default)]
struct CollectingSink {
    frames: Arc<Mutex<Vec<(CameraPosition, u64)>>>,
}

impl RecordingSink for CollectingSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), String> {
        self.frames
            .lock()
            .unwrap()
            .push((frame.position, frame.sequence));
        Ok(())
    }
}

#[test]
fn test_recording_survives_camera_switch() {
    let backend = manual_backend();
    let session = single_session(&backend);
    session.start().unwrap();

    let sink = CollectingSink::default();
    session.start_recording(sink.clone(), None).unwrap();
    assert!(session.is_recording());

    backend.emit_frame(CameraPosition::Back);
    backend.emit_frame(CameraPosition::Back);
    session.switch_camera(CameraPosition::Front).unwrap();
    backend.emit_frame(CameraPosition::Front);

    let summary = session.stop_recording().unwrap();
    assert_eq!(summary.frames_written, 3);
    assert_eq!(summary.frames_dropped, 0);
    assert_eq!(
        *sink.frames.lock().unwrap(),
        vec![
            (CameraPosition::Back, 0),
            (CameraPosition::Back, 1),
            (CameraPosition::Front, 0)
        ]
    );
    assert!(!session.is_recording());
}

#[test]
fn test_dual_recording_takes_back_camera() {
    let backend = manual_backend();
    let session = DualCaptureSessionCoordinator::new(
        Arc::new(backend.clone()),
        SessionOptions::default(),
        PipLayout::default(),
    )
    .unwrap();
    session.setup_blocking().unwrap();
    session.start().unwrap();

    let sink = CollectingSink::default();
    session.start_recording(sink.clone(), None).unwrap();
    for _ in 0..3 {
        backend.emit_frame(CameraPosition::Back);
        backend.emit_frame(CameraPosition::Front);
    }
    let summary = session.stop_recording().unwrap();
    assert_eq!(summary.frames_written, 3);
    assert!(
        sink.frames
            .lock()
            .unwrap()
            .iter()
            .all(|(position, _)| *position == CameraPosition::Back)
    );
}

#[test]
fn test_image_sequence_recording_writes_files() {
    let dir = std::env::temp_dir().join(format!("camera-preview-rec-{}", uuid::Uuid::new_v4()));
    let backend = manual_backend();
    let session = single_session(&backend);
    session.start().unwrap();

    let sink = ImageSequenceSink::new(dir.clone(), 80).unwrap();
    session.start_recording(sink, None).unwrap();
    for _ in 0..4 {
        backend.emit_frame(CameraPosition::Back);
    }
    let summary = session.stop_recording().unwrap();
    assert_eq!(summary.frames_written, 4);
    assert!(summary.first_timestamp_ns <= summary.last_timestamp_ns);

    let written = std::fs::read_dir(&dir).unwrap().count();
    assert_eq!(written, 4);
    let first = image::open(dir.join("frame_000000.jpg")).unwrap();
    assert!(first.width() > 0);
    let _ = std::fs::remove_dir_all(&dir);
}
