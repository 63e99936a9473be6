// SPDX-License-Identifier: GPL-3.0-only

//! Resolution preset negotiation
//!
//! Policy: among presets whose aspect ratio matches, pick the smallest whose
//! short side reaches the target. Aspect always wins over size: when the
//! aspect is constrained and nothing is large enough the request fails rather
//! than substituting a different shape. Only an unconstrained request falls
//! back to the device default.

use crate::backends::camera::types::{AspectPolicy, CameraDevice, Resolution};
use crate::errors::{ConfigError, ConfigResult};
use tracing::{debug, info};

/// Size target plus aspect constraint, kept for later camera switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Minimum short side in pixels
    pub target_size: u32,
    pub aspect: AspectPolicy,
}

impl ResolutionRequest {
    pub fn new(target_size: u32, aspect: AspectPolicy) -> Self {
        Self {
            target_size,
            aspect,
        }
    }
}

/// Choose the preset of `device` that satisfies `request`
pub fn negotiate_resolution(
    device: &CameraDevice,
    request: ResolutionRequest,
) -> ConfigResult<Resolution> {
    let chosen = device
        .presets
        .iter()
        .copied()
        .filter(|r| request.aspect.matches(*r))
        .filter(|r| r.short_side() >= request.target_size)
        .min_by_key(|r| (r.pixel_count(), r.short_side()));

    if let Some(resolution) = chosen {
        info!(
            device = %device.name,
            target = request.target_size,
            aspect = %request.aspect,
            %resolution,
            "Negotiated resolution"
        );
        return Ok(resolution);
    }

    if request.aspect == AspectPolicy::Unconstrained {
        debug!(
            device = %device.name,
            target = request.target_size,
            fallback = %device.default_preset,
            "No preset reaches target, using device default"
        );
        return Ok(device.default_preset);
    }

    Err(ConfigError::UnsupportedResolution {
        target: request.target_size,
        aspect: request.aspect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{CameraPosition, DeviceCapabilities};

    fn device(presets: &[(u32, u32)], default: (u32, u32)) -> CameraDevice {
        CameraDevice {
            id: "test".to_string(),
            name: "Test Camera".to_string(),
            position: CameraPosition::Back,
            capabilities: DeviceCapabilities::default(),
            presets: presets.iter().map(|&(w, h)| Resolution::new(w, h)).collect(),
            default_preset: Resolution::new(default.0, default.1),
        }
    }

    #[test]
    fn test_smallest_4x3_at_least_1080() {
        let dev = device(
            &[(640, 480), (1920, 1080), (4032, 3024), (1440, 1080), (2048, 1536)],
            (1920, 1080),
        );
        let res = negotiate_resolution(&dev, ResolutionRequest::new(1080, AspectPolicy::Ratio4x3));
        assert_eq!(res, Ok(Resolution::new(1440, 1080)));
    }

    #[test]
    fn test_constrained_aspect_never_substitutes() {
        let dev = device(&[(640, 480), (1920, 1080)], (1920, 1080));
        let res = negotiate_resolution(&dev, ResolutionRequest::new(1080, AspectPolicy::Ratio4x3));
        assert_eq!(
            res,
            Err(ConfigError::UnsupportedResolution {
                target: 1080,
                aspect: AspectPolicy::Ratio4x3
            })
        );
    }

    #[test]
    fn test_unconstrained_falls_back_to_default() {
        let dev = device(&[(640, 480), (1280, 720)], (1280, 720));
        let res = negotiate_resolution(
            &dev,
            ResolutionRequest::new(2160, AspectPolicy::Unconstrained),
        );
        assert_eq!(res, Ok(Resolution::new(1280, 720)));
    }

    #[test]
    fn test_portrait_presets_use_short_side() {
        let dev = device(&[(1080, 1920), (720, 1280)], (720, 1280));
        let res = negotiate_resolution(&dev, ResolutionRequest::new(1080, AspectPolicy::Ratio16x9));
        assert_eq!(res, Ok(Resolution::new(1080, 1920)));
    }
}
