// SPDX-License-Identifier: GPL-3.0-only

//! Display refresh clock
//!
//! Runs a [`RenderPipeline`] on its own thread at the display refresh rate,
//! independent of the capture frame rate.

use super::pipeline::{RenderPipeline, RenderStats, TickOutcome};
use super::surface::DisplaySurface;
use crate::backends::camera::frame_loop::{CaptureLoopController, LoopAction};
use crate::constants::render;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Drives a render pipeline from a paced thread
pub struct DisplayLink<S: DisplaySurface> {
    controller: CaptureLoopController,
    pipeline: Arc<Mutex<Option<RenderPipeline<S>>>>,
    refresh_hz: u32,
}

impl<S: DisplaySurface> DisplayLink<S> {
    /// Start ticking `pipeline` `refresh_hz` times per second
    pub fn start(pipeline: RenderPipeline<S>, refresh_hz: u32) -> std::io::Result<Self> {
        let refresh_hz = refresh_hz.clamp(1, render::MAX_REFRESH_HZ);
        let interval = Duration::from_secs_f64(1.0 / refresh_hz as f64);
        let pipeline = Arc::new(Mutex::new(Some(pipeline)));

        let ticking = Arc::clone(&pipeline);
        let controller = CaptureLoopController::start("display-link", interval, move || {
            let mut guard = ticking.lock().unwrap_or_else(|e| e.into_inner());
            let Some(pipeline) = guard.as_mut() else {
                return LoopAction::Stop;
            };
            let outcome = pipeline.tick();
            let stats = pipeline.stats();
            if stats.ticks % render::STATS_LOG_INTERVAL == 0 {
                debug!(
                    ticks = stats.ticks,
                    drawn = stats.drawn,
                    unchanged = stats.unchanged,
                    inactive = stats.inactive,
                    last = ?outcome,
                    "Display link stats"
                );
            }
            LoopAction::Continue
        })?;

        info!(refresh_hz, "Display link started");
        Ok(Self {
            controller,
            pipeline,
            refresh_hz,
        })
    }

    pub fn refresh_hz(&self) -> u32 {
        self.refresh_hz
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Run `f` against the pipeline between ticks
    pub fn with_pipeline<R>(&self, f: impl FnOnce(&mut RenderPipeline<S>) -> R) -> Option<R> {
        let mut guard = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_mut().map(f)
    }

    pub fn stats(&self) -> RenderStats {
        self.with_pipeline(|p| p.stats()).unwrap_or_default()
    }

    /// Tick once from the caller's thread
    pub fn tick_now(&self) -> TickOutcome {
        self.with_pipeline(|p| p.tick())
            .unwrap_or(TickOutcome::Inactive)
    }

    /// Stop the clock and hand the pipeline back
    pub fn stop(mut self) -> Option<RenderPipeline<S>> {
        self.controller.stop();
        let pipeline = self
            .pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(p) = &pipeline {
            let stats = p.stats();
            info!(ticks = stats.ticks, drawn = stats.drawn, "Display link stopped");
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{
        CameraPosition, Frame, FrameData, PixelFormat, VideoOrientation,
    };
    use crate::render::surface::SoftwareSurface;
    use crate::session::FrameSlot;
    use std::time::Instant;

    #[test]
    fn test_display_link_ticks_and_returns_pipeline() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        slot.publish(Frame {
            width: 2,
            height: 2,
            format: PixelFormat::Bgra8,
            stride: 8,
            data: FrameData::Copied(Arc::from(vec![255u8; 16])),
            position: CameraPosition::Back,
            sequence: 0,
            timestamp_ns: 0,
            captured_at: Instant::now(),
            orientation: VideoOrientation::Portrait,
            mirrored: false,
        });

        let pipeline = RenderPipeline::single(Arc::clone(&slot), SoftwareSurface::new(4, 4));
        let link = DisplayLink::start(pipeline, 200).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(link.is_running());

        let pipeline = link.stop().unwrap();
        let stats = pipeline.stats();
        assert!(stats.ticks >= 2);
        assert_eq!(stats.drawn, 1);
        assert_eq!(pipeline.surface().pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn test_refresh_rate_is_clamped() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let pipeline = RenderPipeline::single(slot, SoftwareSurface::new(1, 1));
        let link = DisplayLink::start(pipeline, 0).unwrap();
        assert_eq!(link.refresh_hz(), 1);
        assert_eq!(link.tick_now(), TickOutcome::Unchanged);
        link.stop();
    }
}
