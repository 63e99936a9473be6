// SPDX-License-Identifier: GPL-3.0-only

//! Display surfaces the render pipeline draws into

use super::filters::FilterState;
use super::texture_cache::FrameTexture;
use crate::backends::camera::types::VideoOrientation;
use crate::pipelines::photo::OverlayRect;
use image::{Rgba, RgbaImage};
use std::sync::Arc;

/// One texture placed on the surface
#[derive(Debug, Clone)]
pub struct RenderLayer {
    pub texture: Arc<FrameTexture>,
    /// Destination rectangle in surface pixels
    pub rect: OverlayRect,
    /// Clockwise rotation that brings the texture upright
    pub rotation: VideoOrientation,
    /// Flip horizontally after rotating
    pub mirror: bool,
}

/// Map a texel of the upright image back to sensor order, for a `tw`x`th`
/// texture rotated clockwise by `rotation`
fn source_texel(rotation: VideoOrientation, ux: u32, uy: u32, tw: u32, th: u32) -> (u32, u32) {
    match rotation {
        VideoOrientation::Portrait => (ux, uy),
        VideoOrientation::LandscapeRight => (uy, th - 1 - ux),
        VideoOrientation::PortraitUpsideDown => (tw - 1 - ux, th - 1 - uy),
        VideoOrientation::LandscapeLeft => (tw - 1 - uy, ux),
    }
}

/// Target of one display tick
pub trait DisplaySurface: Send + 'static {
    /// Surface size in pixels
    fn size(&self) -> (u32, u32);

    /// Draw `layers` back to front with `filter` applied, then present
    fn draw(&mut self, layers: &[RenderLayer], filter: &FilterState);
}

/// In-memory surface, used by the CLI preview and tests
pub struct SoftwareSurface {
    framebuffer: RgbaImage,
    presented: u64,
}

impl SoftwareSurface {
    /// Surfaces start out opaque black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            framebuffer: RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([0, 0, 0, 255])),
            presented: 0,
        }
    }

    /// The last presented image
    pub fn framebuffer(&self) -> &RgbaImage {
        &self.framebuffer
    }

    pub fn snapshot(&self) -> RgbaImage {
        self.framebuffer.clone()
    }

    /// Completed draws
    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.framebuffer.get_pixel(x, y).0
    }
}

impl DisplaySurface for SoftwareSurface {
    fn size(&self) -> (u32, u32) {
        self.framebuffer.dimensions()
    }

    fn draw(&mut self, layers: &[RenderLayer], filter: &FilterState) {
        let (sw, sh) = self.framebuffer.dimensions();
        for layer in layers {
            let texture = &layer.texture;
            let (tw, th) = (texture.width(), texture.height());
            let (ow, oh) = if layer.rotation.is_landscape() {
                (th, tw)
            } else {
                (tw, th)
            };
            let rect = layer.rect;
            let x_end = rect.x.saturating_add(rect.width).min(sw);
            let y_end = rect.y.saturating_add(rect.height).min(sh);
            if rect.width == 0 || rect.height == 0 || tw == 0 || th == 0 {
                continue;
            }

            // Nearest-neighbour sampling into the destination rectangle
            for dy in rect.y..y_end {
                let uy = ((dy - rect.y) as u64 * oh as u64 / rect.height as u64) as u32;
                for dx in rect.x..x_end {
                    let mut ux = ((dx - rect.x) as u64 * ow as u64 / rect.width as u64) as u32;
                    if layer.mirror {
                        ux = ow - 1 - ux;
                    }
                    let (tx, ty) = source_texel(layer.rotation, ux, uy, tw, th);
                    let px = filter.apply(texture.rgba_at(tx, ty), dx, dy, sw, sh);
                    self.framebuffer.put_pixel(dx, dy, Rgba(px));
                }
            }
        }
        self.presented += 1;
    }
}

impl std::fmt::Debug for SoftwareSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareSurface")
            .field("size", &self.framebuffer.dimensions())
            .field("presented", &self.presented)
            .finish()
    }
}
