// SPDX-License-Identifier: GPL-3.0-only

//! Frame-to-texture mapping for the render context
//!
//! A [`FrameTexture`] is a sampleable view over a frame's pixel buffer. It
//! holds a reference to the frame instead of copying the pixels, so the
//! hardware buffer stays alive exactly as long as some texture or slot still
//! points at it.
//!
//! The cache keeps at most one mapping per slot. `flush` runs once per
//! display tick and evicts mappings that were not used during that tick.

use crate::backends::camera::types::{CameraPosition, PixelFormat, SharedFrame};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Sampleable view of one captured frame
#[derive(Debug)]
pub struct FrameTexture {
    frame: SharedFrame,
    generation: u64,
}

impl FrameTexture {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn stride(&self) -> u32 {
        self.frame.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.frame.format
    }

    /// Raw pixel rows, borrowed from the frame buffer
    pub fn pixels(&self) -> &[u8] {
        &self.frame.data
    }

    /// Slot generation the frame was published under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frame(&self) -> &SharedFrame {
        &self.frame
    }

    /// Four channel pixel at (x, y) in RGBA order
    #[inline]
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = y as usize * self.frame.stride as usize + x as usize * 4;
        let px = &self.frame.data[offset..offset + 4];
        match self.frame.format {
            PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
            PixelFormat::Rgba8 => [px[0], px[1], px[2], px[3]],
        }
    }
}

struct CacheEntry {
    texture: Arc<FrameTexture>,
    used_this_tick: bool,
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// New mappings created
    pub mapped: u64,
    /// Lookups answered by an existing mapping
    pub reused: u64,
    /// Mappings released by `flush` or `clear`
    pub evicted: u64,
}

/// Per-slot texture mappings owned by the render context
#[derive(Default)]
pub struct TextureCache {
    entries: HashMap<CameraPosition, CacheEntry>,
    stats: CacheStats,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `frame` for the slot at `position`.
    ///
    /// Reuses the existing mapping when the slot has not published a newer
    /// frame; otherwise the previous mapping for this slot is released.
    /// Malformed frames are rejected rather than sampled.
    pub fn map(
        &mut self,
        position: CameraPosition,
        frame: SharedFrame,
        generation: u64,
    ) -> Option<Arc<FrameTexture>> {
        if let Some(entry) = self.entries.get_mut(&position)
            && entry.texture.generation == generation
        {
            entry.used_this_tick = true;
            self.stats.reused += 1;
            return Some(Arc::clone(&entry.texture));
        }

        if !frame.is_well_formed() {
            warn!(
                %position,
                width = frame.width,
                height = frame.height,
                stride = frame.stride,
                len = frame.data.len(),
                "Refusing to map malformed frame"
            );
            return None;
        }

        let texture = Arc::new(FrameTexture { frame, generation });
        let replaced = self.entries.insert(
            position,
            CacheEntry {
                texture: Arc::clone(&texture),
                used_this_tick: true,
            },
        );
        if replaced.is_some() {
            self.stats.evicted += 1;
        }
        self.stats.mapped += 1;
        trace!(%position, generation, "Mapped frame texture");
        Some(texture)
    }

    /// End-of-tick flush: drop mappings not used since the previous flush
    pub fn flush(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let keep = entry.used_this_tick;
            entry.used_this_tick = false;
            keep
        });
        let evicted = before - self.entries.len();
        self.stats.evicted += evicted as u64;
        evicted
    }

    /// Release every mapping
    pub fn clear(&mut self) {
        self.stats.evicted += self.entries.len() as u64;
        self.entries.clear();
    }

    /// Live mappings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl std::fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureCache")
            .field("entries", &self.entries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{Frame, FrameData, VideoOrientation};
    use std::time::Instant;

    fn frame(position: CameraPosition, bgra: [u8; 4]) -> SharedFrame {
        frame_with_stride(position, bgra, 8)
    }

    fn frame_with_stride(position: CameraPosition, bgra: [u8; 4], stride: u32) -> SharedFrame {
        let data: Vec<u8> = bgra.iter().copied().cycle().take(2 * 2 * 4).collect();
        Arc::new(Frame {
            width: 2,
            height: 2,
            format: PixelFormat::Bgra8,
            stride,
            data: FrameData::Copied(Arc::from(data)),
            position,
            sequence: 0,
            timestamp_ns: 0,
            captured_at: Instant::now(),
            orientation: VideoOrientation::Portrait,
            mirrored: false,
        })
    }

    #[test]
    fn test_map_is_zero_copy() {
        let mut cache = TextureCache::new();
        let f = frame(CameraPosition::Back, [1, 2, 3, 255]);
        let texture = cache.map(CameraPosition::Back, Arc::clone(&f), 1).unwrap();
        assert!(Arc::ptr_eq(texture.frame(), &f));
        assert_eq!(texture.pixels().as_ptr(), f.data.as_ptr());
        assert_eq!(texture.rgba_at(1, 1), [3, 2, 1, 255]);
    }

    #[test]
    fn test_same_generation_is_reused() {
        let mut cache = TextureCache::new();
        let f = frame(CameraPosition::Back, [0; 4]);
        let a = cache.map(CameraPosition::Back, Arc::clone(&f), 7).unwrap();
        let b = cache.map(CameraPosition::Back, f, 7).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().reused, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_one_mapping_per_slot() {
        let mut cache = TextureCache::new();
        cache.map(CameraPosition::Back, frame(CameraPosition::Back, [0; 4]), 1);
        let old = cache.map(CameraPosition::Back, frame(CameraPosition::Back, [0; 4]), 1).unwrap();
        cache.map(CameraPosition::Back, frame(CameraPosition::Back, [9; 4]), 2);
        cache.map(CameraPosition::Front, frame(CameraPosition::Front, [0; 4]), 1);
        assert_eq!(cache.len(), 2);
        // Only the caller's handle keeps the replaced frame alive
        assert_eq!(Arc::strong_count(&old), 1);
    }

    #[test]
    fn test_flush_evicts_unused_mappings() {
        let mut cache = TextureCache::new();
        cache.map(CameraPosition::Back, frame(CameraPosition::Back, [0; 4]), 1);
        cache.map(CameraPosition::Front, frame(CameraPosition::Front, [0; 4]), 1);
        assert_eq!(cache.flush(), 0);

        // Next tick only draws the back slot
        cache.map(CameraPosition::Back, frame(CameraPosition::Back, [0; 4]), 1);
        assert_eq!(cache.flush(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        let mut cache = TextureCache::new();
        let bad = frame_with_stride(CameraPosition::Back, [0; 4], 4);
        assert!(cache.map(CameraPosition::Back, bad, 1).is_none());
        assert!(cache.is_empty());
    }
}
