// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::{AspectPolicy, CameraPosition};
use crate::constants::{app_info, photo, recording, render, session};
use crate::errors::{AppError, AppResult};
use crate::pipelines::photo::PipLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Persisted preview and capture settings
///
/// Unknown or missing keys fall back to their defaults so older files keep
/// loading after fields are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera opened by `preview` and `photo` when none is given
    pub default_position: CameraPosition,
    /// Short-side resolution target (1080 for 1080p)
    pub target_size: u32,
    /// Aspect ratio constraint used during negotiation
    pub aspect: AspectPolicy,
    /// Display refresh rate driving the render pipeline
    pub refresh_hz: u32,
    /// Placement of the front image inside dual composites
    pub pip: PipLayout,
    /// Mirror the front camera like a selfie preview
    pub mirror_front: bool,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Frame buffers each stream may have in flight
    pub pool_depth: usize,
    /// Recordings stop accepting frames after this many seconds
    pub max_recording_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_position: CameraPosition::Back,
            target_size: session::DEFAULT_TARGET_SIZE,
            aspect: AspectPolicy::Unconstrained,
            refresh_hz: render::DEFAULT_REFRESH_HZ,
            pip: PipLayout::default(),
            mirror_front: true, // Default to mirrored (selfie mode)
            jpeg_quality: photo::DEFAULT_JPEG_QUALITY,
            pool_depth: session::DEFAULT_POOL_DEPTH,
            max_recording_secs: recording::DEFAULT_MAX_DURATION.as_secs(),
        }
    }
}

impl Config {
    /// `<config dir>/camera-preview/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::CONFIG_DIR).join(app_info::CONFIG_FILE))
    }

    /// Load from the default location; defaults when there is no file
    pub fn load() -> AppResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; defaults when the file does not exist
    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Settings(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded config");
        Ok(config.sanitized())
    }

    /// Write to the default location
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Storage("no config directory available".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write pretty JSON to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Clamp values that would break the pipeline into their valid ranges
    pub fn sanitized(mut self) -> Self {
        self.refresh_hz = self.refresh_hz.clamp(1, render::MAX_REFRESH_HZ);
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self.pool_depth = self.pool_depth.max(2);
        self.target_size = self.target_size.max(1);
        self.pip = self.pip.sanitized();
        self
    }

    pub fn max_recording_duration(&self) -> Duration {
        Duration::from_secs(self.max_recording_secs)
    }
}
