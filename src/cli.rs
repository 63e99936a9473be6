// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running the live preview (single or dual)
//! - Taking single and dual photos
//! - Recording frame sequences
//!
//! All commands run against the virtual backend.

use camera_preview::backends::camera::{CameraBackend, CameraPosition, VirtualBackend};
use camera_preview::config::Config;
use camera_preview::constants::{app_info, timing};
use camera_preview::errors::AppResult;
use camera_preview::pipelines::photo::{
    EncodedImage, EncodingFormat, EncodingQuality, PhotoEncoder,
};
use camera_preview::pipelines::video::ImageSequenceSink;
use camera_preview::render::{
    DisplayLink, FilterHandle, FilterState, FilterType, RenderPipeline, SoftwareSurface,
};
use camera_preview::session::{
    CaptureSessionCoordinator, DualCaptureSessionCoordinator, FrameSlot, SessionOptions,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Preview surface size
const PREVIEW_SIZE: (u32, u32) = (640, 480);

/// Load the config file, falling back to the default location
pub fn load_config(path: Option<&Path>) -> AppResult<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn backend() -> Arc<VirtualBackend> {
    Arc::new(VirtualBackend::new())
}

fn get_default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app_info::CONFIG_DIR)
}

fn get_default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app_info::CONFIG_DIR)
}

/// Wait until every slot holds a frame
fn wait_for_frames(slots: &[&FrameSlot], timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if slots.iter().all(|slot| !slot.is_empty()) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(16));
    }
    false
}

/// Flag cleared by Ctrl+C
fn interrupt_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "Could not install Ctrl+C handler");
    }
    running
}

fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let start = Instant::now();
    while running.load(Ordering::SeqCst) && start.elapsed() < duration {
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn encoder_for(config: &Config, path: Option<&Path>) -> PhotoEncoder {
    let format = path
        .map(EncodingFormat::from_path)
        .unwrap_or(EncodingFormat::Jpeg);
    PhotoEncoder::with_format(format, EncodingQuality::Custom(config.jpeg_quality))
}

fn write_output(encoded: EncodedImage, output: Option<PathBuf>, dual: bool) -> AppResult<PathBuf> {
    match output {
        Some(path) => PhotoEncoder::save_to(&encoded, &path),
        None => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(PhotoEncoder::save(encoded, get_default_photo_dir(), dual))
        }
    }
}

/// List all available cameras
pub fn list_cameras() -> CliResult {
    let backend = VirtualBackend::new();
    let cameras = backend.enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {} ({})", index, camera.name, camera.position);

        let mut presets = camera.presets.clone();
        presets.sort_by_key(|r| std::cmp::Reverse(r.pixel_count()));
        let shown: Vec<String> = presets.iter().take(3).map(|r| r.to_string()).collect();
        println!("      Presets: {}", shown.join(", "));
        println!("      Default: {}", camera.default_preset);

        let caps = &camera.capabilities;
        let mut flags = Vec::new();
        if caps.has_flash {
            flags.push("flash");
        }
        if caps.has_torch {
            flags.push("torch");
        }
        if caps.has_ultra_wide {
            flags.push("ultra-wide");
        }
        if !flags.is_empty() {
            println!("      Features: {}", flags.join(", "));
        }
        println!();
    }

    println!(
        "Dual capture: {}",
        if backend.supports_multi_cam() {
            "supported"
        } else {
            "not supported"
        }
    );
    Ok(())
}

enum PreviewSession {
    Single(CaptureSessionCoordinator),
    Dual(DualCaptureSessionCoordinator),
}

impl PreviewSession {
    fn stop(&self) -> CliResult {
        match self {
            PreviewSession::Single(session) => session.stop()?,
            PreviewSession::Dual(session) => session.stop()?,
        }
        Ok(())
    }
}

/// Run the live preview for `seconds` and print render statistics
pub fn preview(
    config: &Config,
    seconds: u64,
    position: Option<CameraPosition>,
    dual: bool,
    filter: FilterType,
    snapshot: Option<PathBuf>,
) -> CliResult {
    let options = SessionOptions::from_config(config);
    let surface = SoftwareSurface::new(PREVIEW_SIZE.0, PREVIEW_SIZE.1);

    let (session, pipeline) = if dual {
        let session = DualCaptureSessionCoordinator::new(backend(), options, config.pip)?;
        if !session.is_supported() {
            return Err("Dual capture is not supported on this device".into());
        }
        session.setup_blocking()?;
        session.start()?;
        let pipeline = RenderPipeline::dual(
            session.back_slot(),
            session.front_slot(),
            config.pip,
            surface,
        )
        .observe_session(session.subscribe_state());
        (PreviewSession::Dual(session), pipeline)
    } else {
        let session = CaptureSessionCoordinator::new(backend(), options)?;
        let position = position.unwrap_or(config.default_position);
        session.configure(position, config.target_size, config.aspect)?;
        session.start()?;
        let pipeline = RenderPipeline::single(session.frame_slot(), surface)
            .observe_session(session.subscribe_state());
        (PreviewSession::Single(session), pipeline)
    };

    let pipeline = pipeline.with_filter(FilterHandle::new(FilterState::new(filter)));
    println!(
        "Previewing for {} seconds at {} Hz (filter: {}), Ctrl+C to stop",
        seconds, config.refresh_hz, filter
    );

    let running = interrupt_flag();
    let link = DisplayLink::start(pipeline, config.refresh_hz)?;
    sleep_while_running(&running, Duration::from_secs(seconds));
    let pipeline = link.stop();
    session.stop()?;

    let Some(pipeline) = pipeline else {
        return Err("Render pipeline was lost".into());
    };
    let stats = pipeline.stats();
    let cache = pipeline.cache_stats();
    println!(
        "Ticks: {}  drawn: {}  unchanged: {}  inactive: {}",
        stats.ticks, stats.drawn, stats.unchanged, stats.inactive
    );
    println!(
        "Textures mapped: {}  reused: {}  evicted: {}",
        cache.mapped, cache.reused, cache.evicted
    );

    if let Some(path) = snapshot {
        let image = pipeline.surface().snapshot();
        let encoded = encoder_for(config, Some(&path)).encode(&image)?;
        let saved = PhotoEncoder::save_to(&encoded, &path)?;
        println!("Snapshot saved: {}", saved.display());
    }

    pipeline.deallocate();
    Ok(())
}

/// Take a photo with the camera at `position`
pub fn take_photo(
    config: &Config,
    position: Option<CameraPosition>,
    output: Option<PathBuf>,
) -> CliResult {
    let position = position.unwrap_or(config.default_position);
    let session = CaptureSessionCoordinator::new(backend(), SessionOptions::from_config(config))?;
    session.configure(position, config.target_size, config.aspect)?;
    if let Some(resolution) = session.current_resolution() {
        println!("Using {} camera at {}", position, resolution);
    }
    session.start()?;

    let slot = session.frame_slot();
    if !wait_for_frames(&[&slot], timing::FIRST_FRAME_TIMEOUT) {
        session.stop()?;
        return Err("Failed to capture frame from camera".into());
    }

    let image = session.capture_image()?;
    session.stop()?;

    let encoded = encoder_for(config, output.as_deref()).encode(&image)?;
    let path = write_output(encoded, output, false)?;
    println!("Photo saved: {}", path.display());
    Ok(())
}

/// Take a picture-in-picture photo with the front and back cameras
pub fn capture_dual(config: &Config, output: Option<PathBuf>) -> CliResult {
    let session = DualCaptureSessionCoordinator::new(
        backend(),
        SessionOptions::from_config(config),
        config.pip,
    )?;
    if !session.is_supported() {
        return Err("Dual capture is not supported on this device".into());
    }
    session.setup_blocking()?;
    session.start()?;

    let (front, back) = (session.front_slot(), session.back_slot());
    if !wait_for_frames(&[&front, &back], timing::FIRST_FRAME_TIMEOUT) {
        session.stop()?;
        return Err("Failed to receive frames from both cameras".into());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let composite = rt.block_on(session.capture_dual_async())?;
    session.stop()?;

    println!(
        "Composited back frame #{} with front frame #{} ({}x{})",
        composite.back_sequence,
        composite.front_sequence,
        composite.image.width(),
        composite.image.height()
    );
    let encoded = composite.encode(&encoder_for(config, output.as_deref()))?;
    let path = write_output(encoded, output, true)?;
    println!("Photo saved: {}", path.display());
    Ok(())
}

/// Record `seconds` of frames into a JPEG sequence
pub fn record(
    config: &Config,
    seconds: u64,
    position: Option<CameraPosition>,
    output_dir: Option<PathBuf>,
) -> CliResult {
    let position = position.unwrap_or(config.default_position);
    let output_dir = output_dir.unwrap_or_else(|| {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        get_default_video_dir().join(format!("REC_{}", timestamp))
    });

    let session = CaptureSessionCoordinator::new(backend(), SessionOptions::from_config(config))?;
    session.configure(position, config.target_size, config.aspect)?;
    session.start()?;

    let sink = ImageSequenceSink::new(output_dir.clone(), config.jpeg_quality)?;
    session.start_recording(sink, Some(config.max_recording_duration()))?;
    println!("Output: {}", output_dir.display());
    println!("Duration: {} seconds", seconds);

    let running = interrupt_flag();
    sleep_while_running(&running, Duration::from_secs(seconds));

    let summary = session.stop_recording()?;
    session.stop()?;

    println!(
        "Recorded {} frames ({} dropped) in {:.1}s",
        summary.frames_written,
        summary.frames_dropped,
        summary.duration.as_secs_f64()
    );
    Ok(())
}
