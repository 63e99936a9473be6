// SPDX-License-Identifier: GPL-3.0-only

//! CPU filter kernels and the shared filter state
//!
//! Every pipeline reads one [`FilterState`] per tick. Updates replace the
//! whole state; readers holding the previous `Arc` keep using it until
//! their tick ends.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Filter applied to every rendered pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterType {
    /// No filter applied
    #[default]
    Standard,
    /// Black & white
    Mono,
    /// Warm brownish tint
    Sepia,
    /// High contrast black & white
    Noir,
    /// Boosted saturation and contrast
    Vivid,
    /// Blue color temperature shift
    Cool,
    /// Orange color temperature shift
    Warm,
    /// Lifted blacks with muted colors
    Fade,
    /// Two-color gradient mapping
    Duotone,
    /// Darkened edges
    Vignette,
    /// Inverted colors
    Negative,
    /// Reduced color levels
    Posterize,
    /// Partially inverted tones
    Solarize,
}

impl FilterType {
    pub const ALL: [FilterType; 13] = [
        FilterType::Standard,
        FilterType::Mono,
        FilterType::Sepia,
        FilterType::Noir,
        FilterType::Vivid,
        FilterType::Cool,
        FilterType::Warm,
        FilterType::Fade,
        FilterType::Duotone,
        FilterType::Vignette,
        FilterType::Negative,
        FilterType::Posterize,
        FilterType::Solarize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterType::Standard => "standard",
            FilterType::Mono => "mono",
            FilterType::Sepia => "sepia",
            FilterType::Noir => "noir",
            FilterType::Vivid => "vivid",
            FilterType::Cool => "cool",
            FilterType::Warm => "warm",
            FilterType::Fade => "fade",
            FilterType::Duotone => "duotone",
            FilterType::Vignette => "vignette",
            FilterType::Negative => "negative",
            FilterType::Posterize => "posterize",
            FilterType::Solarize => "solarize",
        }
    }
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        FilterType::ALL
            .into_iter()
            .find(|f| f.name() == lower || (lower == "none" && *f == FilterType::Standard))
            .ok_or_else(|| format!("unknown filter '{}'", s))
    }
}

/// Filter plus its strength
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub filter: FilterType,
    /// Blend between the original (0.0) and fully filtered (1.0) pixel
    pub intensity: f32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            filter: FilterType::Standard,
            intensity: 1.0,
        }
    }
}

impl FilterState {
    pub fn new(filter: FilterType) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self
    }

    /// Whether applying the state leaves pixels untouched
    pub fn is_identity(&self) -> bool {
        self.filter == FilterType::Standard || self.intensity <= 0.0
    }

    /// Filter one RGBA pixel at (x, y) of a `width` x `height` image
    #[inline]
    pub fn apply(&self, px: [u8; 4], x: u32, y: u32, width: u32, height: u32) -> [u8; 4] {
        if self.is_identity() {
            return px;
        }
        let (r0, g0, b0) = (
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        );
        let (mut r, mut g, mut b) = (r0, g0, b0);
        apply_filter_rgb(&mut r, &mut g, &mut b, self.filter, x, y, width, height);

        let t = self.intensity;
        let mix = |orig: f32, filtered: f32| {
            ((orig + (filtered - orig) * t).clamp(0.0, 1.0) * 255.0).round() as u8
        };
        [mix(r0, r), mix(g0, g), mix(b0, b), px[3]]
    }
}

/// Shared, replaceable filter state
#[derive(Debug, Clone, Default)]
pub struct FilterHandle {
    inner: Arc<RwLock<Arc<FilterState>>>,
}

impl FilterHandle {
    pub fn new(state: FilterState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(state))),
        }
    }

    /// Snapshot for one tick
    pub fn current(&self) -> Arc<FilterState> {
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the whole state
    pub fn set(&self, state: FilterState) {
        debug!(filter = %state.filter, intensity = state.intensity, "Filter changed");
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(state);
    }
}

/// Apply filter effect to RGB values in-place (components in 0.0..=1.0)
#[inline]
#[allow(clippy::too_many_arguments)]
fn apply_filter_rgb(
    r: &mut f32,
    g: &mut f32,
    b: &mut f32,
    filter: FilterType,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) {
    let luminance = 0.299 * *r + 0.587 * *g + 0.114 * *b;
    match filter {
        FilterType::Standard => {}

        FilterType::Mono => {
            *r = luminance;
            *g = luminance;
            *b = luminance;
        }

        FilterType::Sepia => {
            *r = (luminance * 1.2 + 0.1).clamp(0.0, 1.0);
            *g = (luminance * 0.9 + 0.05).clamp(0.0, 1.0);
            *b = (luminance * 0.7).clamp(0.0, 1.0);
        }

        FilterType::Noir => {
            let adjusted = ((luminance - 0.5) * 2.0 + 0.5).clamp(0.0, 1.0);
            *r = adjusted;
            *g = adjusted;
            *b = adjusted;
        }

        FilterType::Vivid => {
            for c in [&mut *r, &mut *g, &mut *b] {
                let saturated = (luminance + (*c - luminance) * 1.4).clamp(0.0, 1.0);
                *c = ((saturated - 0.5) * 1.15 + 0.5).clamp(0.0, 1.0);
            }
        }

        FilterType::Cool => {
            *r = (*r * 0.9).clamp(0.0, 1.0);
            *g = (*g * 0.95).clamp(0.0, 1.0);
            *b = (*b * 1.1).clamp(0.0, 1.0);
        }

        FilterType::Warm => {
            *r = (*r * 1.1).clamp(0.0, 1.0);
            *b = (*b * 0.85).clamp(0.0, 1.0);
        }

        FilterType::Fade => {
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (*c * 0.85 + 0.1).clamp(0.0, 1.0);
            }
            let faded = 0.299 * *r + 0.587 * *g + 0.114 * *b;
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (faded + (*c - faded) * 0.7).clamp(0.0, 1.0);
            }
        }

        FilterType::Duotone => {
            let dark = (0.1, 0.1, 0.4);
            let light = (1.0, 0.9, 0.5);
            *r = dark.0 + luminance * (light.0 - dark.0);
            *g = dark.1 + luminance * (light.1 - dark.1);
            *b = dark.2 + luminance * (light.2 - dark.2);
        }

        FilterType::Vignette => {
            let dx = x as f32 / width.max(1) as f32 - 0.5;
            let dy = y as f32 / height.max(1) as f32 - 0.5;
            let vignette = 1.0 - smoothstep(0.3, 0.9, (dx * dx + dy * dy).sqrt());
            *r *= vignette;
            *g *= vignette;
            *b *= vignette;
        }

        FilterType::Negative => {
            *r = 1.0 - *r;
            *g = 1.0 - *g;
            *b = 1.0 - *b;
        }

        FilterType::Posterize => {
            let levels = 4.0;
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (*c * levels).floor() / levels;
            }
        }

        FilterType::Solarize => {
            for c in [&mut *r, &mut *g, &mut *b] {
                if *c > 0.5 {
                    *c = 1.0 - *c;
                }
            }
        }
    }
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_identity() {
        let state = FilterState::default();
        assert!(state.is_identity());
        assert_eq!(state.apply([10, 20, 30, 40], 0, 0, 1, 1), [10, 20, 30, 40]);
    }

    #[test]
    fn test_mono_equalizes_channels() {
        let px = FilterState::new(FilterType::Mono).apply([200, 100, 50, 255], 0, 0, 1, 1);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_negative_and_intensity() {
        let full = FilterState::new(FilterType::Negative);
        assert_eq!(full.apply([0, 255, 100, 7], 0, 0, 1, 1), [255, 0, 155, 7]);

        let none = full.with_intensity(0.0);
        assert!(none.is_identity());
        assert_eq!(none.apply([0, 255, 100, 7], 0, 0, 1, 1), [0, 255, 100, 7]);
    }

    #[test]
    fn test_vignette_darkens_corners_only() {
        let state = FilterState::new(FilterType::Vignette);
        let center = state.apply([200, 200, 200, 255], 50, 50, 100, 100);
        let corner = state.apply([200, 200, 200, 255], 0, 0, 100, 100);
        assert_eq!(center, [200, 200, 200, 255]);
        assert!(corner[0] < 200);
    }

    #[test]
    fn test_parse_filter_names() {
        for filter in FilterType::ALL {
            assert_eq!(filter.name().parse::<FilterType>().unwrap(), filter);
        }
        assert_eq!("None".parse::<FilterType>().unwrap(), FilterType::Standard);
        assert!("glitch".parse::<FilterType>().is_err());
    }

    #[test]
    fn test_handle_replaces_state() {
        let handle = FilterHandle::default();
        let before = handle.current();
        handle.set(FilterState::new(FilterType::Sepia));
        assert_eq!(before.filter, FilterType::Standard);
        assert_eq!(handle.current().filter, FilterType::Sepia);

        let clone = handle.clone();
        clone.set(FilterState::new(FilterType::Noir));
        assert_eq!(handle.current().filter, FilterType::Noir);
    }
}
