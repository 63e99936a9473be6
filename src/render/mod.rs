// SPDX-License-Identifier: GPL-3.0-only

//! Preview rendering
//!
//! ```text
//! FrameSlot(s) ──peek──▶ TextureCache ──▶ DisplaySurface
//!                             ▲                 ▲
//!                        flush per tick    FilterState
//!
//! DisplayLink: paced thread calling RenderPipeline::tick at the refresh rate
//! ```
//!
//! The texture cache belongs to the render context alone. Capture callbacks
//! only publish into slots; they never touch textures.

pub mod display_link;
pub mod filters;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod pipeline;
pub mod surface;
pub mod texture_cache;

pub use display_link::DisplayLink;
pub use filters::{FilterHandle, FilterState, FilterType};
pub use pipeline::{RenderPipeline, RenderStats, TickOutcome};
pub use surface::{DisplaySurface, RenderLayer, SoftwareSurface};
pub use texture_cache::{CacheStats, FrameTexture, TextureCache};
