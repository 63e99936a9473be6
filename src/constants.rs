// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Session defaults
pub mod session {
    /// Default short-side target for resolution negotiation (1080p)
    pub const DEFAULT_TARGET_SIZE: u32 = 1080;

    /// Frame buffers each stream may have in flight
    ///
    /// One sits in the frame slot, one is being rendered or composited,
    /// the rest belong to the hardware.
    pub const DEFAULT_POOL_DEPTH: usize = 4;

    /// Resolution requested for each camera of a dual session
    pub const DUAL_TARGET_SIZE: u32 = 1080;

    /// Aspect tolerance when matching presets, in percent
    pub const ASPECT_TOLERANCE_PERCENT: u64 = 1;

    /// Thread name of the single-camera session queue
    pub const SINGLE_QUEUE_NAME: &str = "session-queue";

    /// Thread name of the dual-camera session queue
    pub const DUAL_QUEUE_NAME: &str = "dual-session-queue";
}

/// Picture-in-picture composite layout
pub mod pip {
    /// Overlay width as a fraction of the background width
    pub const WIDTH_FRACTION: f32 = 0.3;

    /// Gap between the overlay and the image edges, in pixels
    pub const PADDING: u32 = 16;

    /// Largest accepted padding, in pixels
    pub const MAX_PADDING: u32 = 4096;

    /// Thread name of the composite worker
    pub const WORKER_NAME: &str = "composite-worker";
}

/// Preview rendering
pub mod render {
    /// Display refresh rate when none is configured
    pub const DEFAULT_REFRESH_HZ: u32 = 60;

    /// Highest accepted refresh rate
    pub const MAX_REFRESH_HZ: u32 = 240;

    /// Log render statistics every N display ticks
    pub const STATS_LOG_INTERVAL: u64 = 300;
}

/// Frame recording
pub mod recording {
    use super::Duration;

    /// Frames buffered between the capture thread and the sink
    pub const CHANNEL_CAPACITY: usize = 8;

    /// Default cap on recording length
    pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60 * 30);
}

/// Still image output
pub mod photo {
    /// JPEG quality used when none is configured
    pub const DEFAULT_JPEG_QUALITY: u8 = 92;

    /// File name prefix for saved photos
    pub const FILE_PREFIX: &str = "IMG";

    /// File name prefix for saved composites
    pub const DUAL_FILE_PREFIX: &str = "DUAL";
}

/// Virtual camera backend
pub mod virtual_camera {
    /// Frame rate of continuous virtual streams
    pub const FPS: u32 = 30;

    /// Widest frame buffer a virtual stream produces
    pub const MAX_FRAME_WIDTH: u32 = 320;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Log frame statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// How long the CLI waits for the first frame before giving up
    pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(3);
}

/// Application info
pub mod app_info {
    /// Application version (from git tag or Cargo.toml)
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Config directory name under the platform config dir
    pub const CONFIG_DIR: &str = "camera-preview";

    /// Config file name
    pub const CONFIG_FILE: &str = "config.json";
}
