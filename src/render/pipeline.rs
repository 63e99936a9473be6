// SPDX-License-Identifier: GPL-3.0-only

//! Display-clock driven preview rendering
//!
//! Each tick peeks the source slots, maps the frames through the texture
//! cache, draws them with the current filter and flushes the cache. A tick
//! with an empty slot draws nothing, leaving the previous output on screen.

use super::filters::{FilterHandle, FilterState};
use super::surface::{DisplaySurface, RenderLayer};
use super::texture_cache::{CacheStats, FrameTexture, TextureCache};
use crate::backends::camera::types::SessionState;
use crate::pipelines::photo::{OverlayRect, PipLayout};
use crate::session::FrameSlot;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// New output presented
    Drawn { layers: usize },
    /// Previous output kept (no new frame, or a slot is still empty)
    Unchanged,
    /// The observed session is not running; cached textures were released
    Inactive,
}

/// Counters since the pipeline was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub ticks: u64,
    pub drawn: u64,
    pub unchanged: u64,
    pub inactive: u64,
}

enum Sources {
    Single(Arc<FrameSlot>),
    Dual {
        back: Arc<FrameSlot>,
        front: Arc<FrameSlot>,
        layout: PipLayout,
    },
}

impl Sources {
    fn slots(&self) -> Vec<&Arc<FrameSlot>> {
        match self {
            Sources::Single(slot) => vec![slot],
            Sources::Dual { back, front, .. } => vec![back, front],
        }
    }
}

/// Draws the latest frames of one or two slots onto a surface
pub struct RenderPipeline<S: DisplaySurface> {
    sources: Sources,
    surface: S,
    cache: TextureCache,
    filter: FilterHandle,
    session_state: Option<watch::Receiver<SessionState>>,
    last_drawn: Option<(Vec<u64>, Arc<FilterState>)>,
    stats: RenderStats,
}

impl<S: DisplaySurface> RenderPipeline<S> {
    /// Full-surface preview of one slot
    pub fn single(slot: Arc<FrameSlot>, surface: S) -> Self {
        Self::with_sources(Sources::Single(slot), surface)
    }

    /// Back slot full-surface with the front slot as picture-in-picture
    pub fn dual(back: Arc<FrameSlot>, front: Arc<FrameSlot>, layout: PipLayout, surface: S) -> Self {
        Self::with_sources(
            Sources::Dual {
                back,
                front,
                layout: layout.sanitized(),
            },
            surface,
        )
    }

    fn with_sources(sources: Sources, surface: S) -> Self {
        Self {
            sources,
            surface,
            cache: TextureCache::new(),
            filter: FilterHandle::default(),
            session_state: None,
            last_drawn: None,
            stats: RenderStats::default(),
        }
    }

    /// Share a filter handle with other pipelines or the host
    pub fn with_filter(mut self, filter: FilterHandle) -> Self {
        self.filter = filter;
        self
    }

    /// Release cached textures whenever the session is not running
    pub fn observe_session(mut self, state: watch::Receiver<SessionState>) -> Self {
        self.session_state = Some(state);
        self
    }

    pub fn filter(&self) -> &FilterHandle {
        &self.filter
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Render one display tick
    pub fn tick(&mut self) -> TickOutcome {
        self.stats.ticks += 1;

        if let Some(state) = &self.session_state {
            let current = *state.borrow();
            if current != SessionState::Running {
                if !self.cache.is_empty() {
                    debug!(%current, "Session not running, releasing textures");
                    self.cache.clear();
                }
                self.stats.inactive += 1;
                return TickOutcome::Inactive;
            }
        }

        let mut frames = Vec::with_capacity(2);
        for slot in self.sources.slots() {
            match slot.peek_with_generation() {
                Some(entry) => frames.push((slot.position(), entry)),
                None => {
                    trace!(position = %slot.position(), "Slot empty, keeping previous output");
                    self.cache.flush();
                    self.stats.unchanged += 1;
                    return TickOutcome::Unchanged;
                }
            }
        }

        let filter = self.filter.current();
        let generations: Vec<u64> = frames.iter().map(|(_, (_, g))| *g).collect();
        if let Some((last_generations, last_filter)) = &self.last_drawn
            && *last_generations == generations
            && **last_filter == *filter
        {
            // Nothing new: keep the mappings alive for the next tick
            for (position, (frame, generation)) in frames {
                self.cache.map(position, frame, generation);
            }
            self.cache.flush();
            self.stats.unchanged += 1;
            return TickOutcome::Unchanged;
        }

        let mut textures = Vec::with_capacity(frames.len());
        for (position, (frame, generation)) in frames {
            match self.cache.map(position, frame, generation) {
                Some(texture) => textures.push(texture),
                None => {
                    self.cache.flush();
                    self.stats.unchanged += 1;
                    return TickOutcome::Unchanged;
                }
            }
        }

        let layers = self.place(textures);
        self.surface.draw(&layers, &filter);
        let drawn = layers.len();
        drop(layers);
        self.cache.flush();

        self.last_drawn = Some((generations, filter));
        self.stats.drawn += 1;
        TickOutcome::Drawn { layers: drawn }
    }

    fn place(&self, textures: Vec<Arc<FrameTexture>>) -> Vec<RenderLayer> {
        let (sw, sh) = self.surface.size();
        let full = OverlayRect {
            x: 0,
            y: 0,
            width: sw,
            height: sh,
        };

        let mut layers = Vec::with_capacity(textures.len());
        let mut textures = textures.into_iter();
        // Frames flagged `mirrored` are already flipped; only the layout
        // decides whether the front camera is flipped again
        if let Some(background) = textures.next() {
            layers.push(RenderLayer {
                rotation: background.frame().orientation,
                mirror: false,
                texture: background,
                rect: full,
            });
        }
        if let (Sources::Dual { layout, .. }, Some(front)) = (&self.sources, textures.next()) {
            let upright = front.frame().oriented_resolution();
            let rect = layout.overlay_rect((sw, sh), (upright.width, upright.height));
            match rect {
                Some(rect) => layers.push(RenderLayer {
                    rotation: front.frame().orientation,
                    mirror: layout.mirror_front,
                    texture: front,
                    rect,
                }),
                None => trace!("Surface too small for picture-in-picture"),
            }
        }
        layers
    }

    /// Release every cached texture and the frames held by the slots,
    /// returning the surface
    pub fn deallocate(mut self) -> S {
        self.cache.clear();
        for slot in self.sources.slots() {
            slot.clear();
        }
        self.last_drawn = None;
        info!(
            ticks = self.stats.ticks,
            drawn = self.stats.drawn,
            "Render pipeline deallocated"
        );
        self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{
        CameraPosition, Frame, FrameData, PixelFormat, VideoOrientation,
    };
    use crate::pipelines::photo::{PipCorner, compose};
    use crate::render::filters::FilterType;
    use crate::render::surface::SoftwareSurface;
    use std::time::Instant;

    fn solid(position: CameraPosition, w: u32, h: u32, bgra: [u8; 4]) -> Frame {
        let data: Vec<u8> = bgra.iter().copied().cycle().take((w * h * 4) as usize).collect();
        Frame {
            width: w,
            height: h,
            format: PixelFormat::Bgra8,
            stride: w * 4,
            data: FrameData::Copied(Arc::from(data)),
            position,
            sequence: 0,
            timestamp_ns: 0,
            captured_at: Instant::now(),
            orientation: VideoOrientation::Portrait,
            mirrored: false,
        }
    }

    /// Every pixel distinct so any flip or rotation shows
    fn gradient(
        position: CameraPosition,
        w: u32,
        h: u32,
        orientation: VideoOrientation,
        mirrored: bool,
    ) -> Frame {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 30) as u8, (y * 30) as u8, 90, 255]);
            }
        }
        Frame {
            data: FrameData::Copied(Arc::from(data)),
            orientation,
            mirrored,
            ..solid(position, w, h, [0, 0, 0, 255])
        }
    }

    /// Render one dual tick at the back frame's upright size and compare it
    /// with the still composite of the same frames
    fn assert_preview_matches_composite(back: Frame, front: Frame, mirror_front: bool) {
        let layout = PipLayout {
            corner: PipCorner::TopLeft,
            padding: 0,
            width_fraction: 0.5,
            mirror_front,
        };
        let still = compose(&front, &back, &layout).unwrap();

        let upright = back.oriented_resolution();
        let back_slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let front_slot = Arc::new(FrameSlot::new(CameraPosition::Front));
        let mut pipeline = RenderPipeline::dual(
            Arc::clone(&back_slot),
            Arc::clone(&front_slot),
            layout,
            SoftwareSurface::new(upright.width, upright.height),
        );
        back_slot.publish(back);
        front_slot.publish(front);
        assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 2 });

        assert_eq!(pipeline.surface().framebuffer().dimensions(), still.dimensions());
        for (x, y, px) in still.enumerate_pixels() {
            assert_eq!(
                pipeline.surface().pixel(x, y),
                px.0,
                "pixel ({}, {}) mirror_front={}",
                x,
                y,
                mirror_front
            );
        }
    }

    #[test]
    fn test_preview_matches_composite_for_mirrored_front() {
        for mirror_front in [false, true] {
            assert_preview_matches_composite(
                gradient(CameraPosition::Back, 8, 4, VideoOrientation::Portrait, false),
                gradient(CameraPosition::Front, 4, 2, VideoOrientation::Portrait, true),
                mirror_front,
            );
        }
    }

    #[test]
    fn test_preview_matches_composite_when_rotated() {
        for mirror_front in [false, true] {
            assert_preview_matches_composite(
                gradient(CameraPosition::Back, 4, 8, VideoOrientation::LandscapeRight, false),
                gradient(CameraPosition::Front, 2, 4, VideoOrientation::LandscapeLeft, true),
                mirror_front,
            );
            assert_preview_matches_composite(
                gradient(CameraPosition::Back, 8, 4, VideoOrientation::PortraitUpsideDown, false),
                gradient(CameraPosition::Front, 4, 2, VideoOrientation::PortraitUpsideDown, false),
                mirror_front,
            );
        }
    }

    #[test]
    fn test_empty_slot_keeps_previous_output() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let mut pipeline = RenderPipeline::single(Arc::clone(&slot), SoftwareSurface::new(8, 8));
        assert_eq!(pipeline.tick(), TickOutcome::Unchanged);
        assert_eq!(pipeline.surface().pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(pipeline.surface().presented(), 0);
    }

    #[test]
    fn test_draws_latest_frame() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let mut pipeline = RenderPipeline::single(Arc::clone(&slot), SoftwareSurface::new(8, 8));
        slot.publish(solid(CameraPosition::Back, 4, 4, [0, 0, 255, 255]));
        assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 1 });
        assert_eq!(pipeline.surface().pixel(7, 7), [255, 0, 0, 255]);

        // Same frame again is not redrawn
        assert_eq!(pipeline.tick(), TickOutcome::Unchanged);
        assert_eq!(pipeline.cache_len(), 1);

        slot.publish(solid(CameraPosition::Back, 4, 4, [255, 0, 0, 255]));
        assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 1 });
        assert_eq!(pipeline.surface().pixel(0, 0), [0, 0, 255, 255]);
        assert_eq!(pipeline.cache_len(), 1);
    }

    #[test]
    fn test_filter_change_redraws() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let mut pipeline = RenderPipeline::single(Arc::clone(&slot), SoftwareSurface::new(4, 4));
        slot.publish(solid(CameraPosition::Back, 4, 4, [0, 0, 0, 255]));
        pipeline.tick();

        pipeline
            .filter()
            .set(FilterState::new(FilterType::Negative));
        assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 1 });
        assert_eq!(pipeline.surface().pixel(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn test_dual_places_front_overlay() {
        let back = Arc::new(FrameSlot::new(CameraPosition::Back));
        let front = Arc::new(FrameSlot::new(CameraPosition::Front));
        let layout = PipLayout {
            padding: 2,
            ..PipLayout::default()
        };
        let mut pipeline = RenderPipeline::dual(
            Arc::clone(&back),
            Arc::clone(&front),
            layout,
            SoftwareSurface::new(40, 30),
        );

        back.publish(solid(CameraPosition::Back, 8, 6, [0, 0, 200, 255]));
        assert_eq!(pipeline.tick(), TickOutcome::Unchanged);

        front.publish(solid(CameraPosition::Front, 8, 6, [200, 0, 0, 255]));
        assert_eq!(pipeline.tick(), TickOutcome::Drawn { layers: 2 });
        // Top right corner holds the front image, bottom left the back one
        assert_eq!(pipeline.surface().pixel(36, 4), [0, 0, 200, 255]);
        assert_eq!(pipeline.surface().pixel(1, 28), [200, 0, 0, 255]);
        assert_eq!(pipeline.cache_len(), 2);
    }

    #[test]
    fn test_inactive_session_releases_textures() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let (tx, rx) = watch::channel(SessionState::Running);
        let mut pipeline = RenderPipeline::single(Arc::clone(&slot), SoftwareSurface::new(4, 4))
            .observe_session(rx);
        slot.publish(solid(CameraPosition::Back, 4, 4, [1, 2, 3, 255]));
        pipeline.tick();
        assert_eq!(pipeline.cache_len(), 1);

        tx.send_replace(SessionState::Stopped);
        assert_eq!(pipeline.tick(), TickOutcome::Inactive);
        assert_eq!(pipeline.cache_len(), 0);
    }

    #[test]
    fn test_deallocate_releases_frames() {
        let slot = Arc::new(FrameSlot::new(CameraPosition::Back));
        let pipeline = RenderPipeline::single(Arc::clone(&slot), SoftwareSurface::new(4, 4));
        // Never rendered
        let surface = pipeline.deallocate();
        assert_eq!(surface.presented(), 0);

        let mut pipeline = RenderPipeline::single(Arc::clone(&slot), surface);
        slot.publish(solid(CameraPosition::Back, 4, 4, [1, 2, 3, 255]));
        pipeline.tick();
        let held = slot.peek().unwrap();
        pipeline.deallocate();
        assert!(slot.is_empty());
        assert_eq!(Arc::strong_count(&held), 1);
    }
}
