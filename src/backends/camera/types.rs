// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use super::buffer_pool::BufferLease;
use crate::constants::session;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Physical placement of a camera on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraPosition {
    /// User-facing camera
    Front,
    /// Main rear wide-angle camera
    #[default]
    Back,
    /// Rear ultra-wide camera
    UltraWide,
}

impl CameraPosition {
    pub const ALL: [CameraPosition; 3] = [
        CameraPosition::Front,
        CameraPosition::Back,
        CameraPosition::UltraWide,
    ];
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
            CameraPosition::UltraWide => write!(f, "ultra-wide"),
        }
    }
}

impl std::str::FromStr for CameraPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(CameraPosition::Front),
            "back" | "rear" => Ok(CameraPosition::Back),
            "ultra-wide" | "ultrawide" | "ultra_wide" => Ok(CameraPosition::UltraWide),
            other => Err(format!("unknown camera position '{}'", other)),
        }
    }
}

/// Capability flags reported by the platform at enumeration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub has_flash: bool,
    pub has_torch: bool,
    pub has_ultra_wide: bool,
}

/// A capture resolution preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of the shorter side (the "1080" in 1080p)
    pub fn short_side(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Swap width and height (landscape sensor buffer shown in portrait)
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Aspect ratio constraint for resolution negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectPolicy {
    /// Any aspect ratio is acceptable
    #[default]
    Unconstrained,
    /// 4:3 (photo sensors)
    Ratio4x3,
    /// 16:9 (video)
    Ratio16x9,
    /// 1:1 (square)
    Ratio1x1,
}

impl AspectPolicy {
    /// Ratio as (long side, short side), `None` when unconstrained
    pub fn ratio(&self) -> Option<(u32, u32)> {
        match self {
            AspectPolicy::Unconstrained => None,
            AspectPolicy::Ratio4x3 => Some((4, 3)),
            AspectPolicy::Ratio16x9 => Some((16, 9)),
            AspectPolicy::Ratio1x1 => Some((1, 1)),
        }
    }

    /// Whether a resolution matches this ratio within the aspect tolerance
    /// (orientation independent)
    pub fn matches(&self, resolution: Resolution) -> bool {
        let Some((long, short)) = self.ratio() else {
            return true;
        };
        let res_long = resolution.width.max(resolution.height) as u64;
        let res_short = resolution.width.min(resolution.height) as u64;
        if res_short == 0 {
            return false;
        }
        // |res_long/res_short - long/short| <= tolerance% of long/short
        let lhs = res_long * short as u64;
        let rhs = res_short * long as u64;
        lhs.abs_diff(rhs) * 100 <= rhs * session::ASPECT_TOLERANCE_PERCENT
    }
}

impl std::fmt::Display for AspectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AspectPolicy::Unconstrained => write!(f, "any"),
            AspectPolicy::Ratio4x3 => write!(f, "4:3"),
            AspectPolicy::Ratio16x9 => write!(f, "16:9"),
            AspectPolicy::Ratio1x1 => write!(f, "1:1"),
        }
    }
}

impl std::str::FromStr for AspectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "any" | "none" => Ok(AspectPolicy::Unconstrained),
            "4:3" | "3:4" => Ok(AspectPolicy::Ratio4x3),
            "16:9" | "9:16" => Ok(AspectPolicy::Ratio16x9),
            "1:1" => Ok(AspectPolicy::Ratio1x1),
            other => Err(format!("unsupported aspect ratio '{}'", other)),
        }
    }
}

/// Physical orientation of the device as reported by its motion sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceOrientation {
    #[default]
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

/// Orientation applied to the video output connection
///
/// The value rides along with every produced frame so that consumers know
/// how the buffer was laid out when it left the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl VideoOrientation {
    /// Map a device rotation to the capture connection orientation.
    ///
    /// Landscape is mirrored: rotating the device left turns the sensor
    /// image right. Flat and unknown orientations fall back to portrait.
    pub fn from_device(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::Portrait => VideoOrientation::Portrait,
            DeviceOrientation::PortraitUpsideDown => VideoOrientation::PortraitUpsideDown,
            DeviceOrientation::LandscapeLeft => VideoOrientation::LandscapeRight,
            DeviceOrientation::LandscapeRight => VideoOrientation::LandscapeLeft,
            DeviceOrientation::FaceUp
            | DeviceOrientation::FaceDown
            | DeviceOrientation::Unknown => VideoOrientation::Portrait,
        }
    }

    /// Create orientation from an integer degree value (normalised to 0-360)
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => VideoOrientation::LandscapeRight,
            180 => VideoOrientation::PortraitUpsideDown,
            270 => VideoOrientation::LandscapeLeft,
            _ => VideoOrientation::Portrait,
        }
    }

    /// Clockwise rotation in degrees relative to portrait
    pub fn degrees(&self) -> u32 {
        match self {
            VideoOrientation::Portrait => 0,
            VideoOrientation::LandscapeRight => 90,
            VideoOrientation::PortraitUpsideDown => 180,
            VideoOrientation::LandscapeLeft => 270,
        }
    }

    pub fn is_landscape(&self) -> bool {
        matches!(
            self,
            VideoOrientation::LandscapeLeft | VideoOrientation::LandscapeRight
        )
    }

    pub(crate) fn to_code(self) -> u8 {
        match self {
            VideoOrientation::Portrait => 0,
            VideoOrientation::LandscapeRight => 1,
            VideoOrientation::PortraitUpsideDown => 2,
            VideoOrientation::LandscapeLeft => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            1 => VideoOrientation::LandscapeRight,
            2 => VideoOrientation::PortraitUpsideDown,
            3 => VideoOrientation::LandscapeLeft,
            _ => VideoOrientation::Portrait,
        }
    }
}

impl std::fmt::Display for VideoOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Stable platform identifier
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
    pub capabilities: DeviceCapabilities,
    /// Resolution presets the device can stream, in no particular order
    pub presets: Vec<Resolution>,
    /// What the device picks when nothing is requested
    pub default_preset: Resolution,
}

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit B G R A, the native capture format
    Bgra8,
    /// 32-bit R G B A
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// Frame data storage - either pre-copied bytes or a buffer leased from a
/// hardware pool.
///
/// A `Pooled` buffer goes back to its pool when the owning frame drops, so
/// holding frames longer than necessary starves the capture hardware.
pub enum FrameData {
    /// Pre-copied bytes (file sources, tests, conversions)
    Copied(Arc<[u8]>),
    /// Buffer leased from a capture buffer pool
    Pooled(BufferLease),
}

impl FrameData {
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Pooled(lease) => write!(f, "FrameData::Pooled({} bytes)", lease.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Pooled(lease) => lease.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// One hardware-produced video image
#[derive(Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub data: FrameData,
    /// Which camera produced the frame
    pub position: CameraPosition,
    /// Per-stream sequence number, strictly increasing in capture order
    pub sequence: u64,
    /// Sensor timestamp in nanoseconds since the stream started
    pub timestamp_ns: u64,
    /// Wall-clock instant the capture callback received the frame
    pub captured_at: Instant,
    /// Connection orientation at capture time. Pixels are stored in sensor
    /// order; consumers rotate by this clockwise to display upright.
    pub orientation: VideoOrientation,
    /// Pixels were already flipped horizontally by the connection (selfie
    /// preview). Consumers must not flip again on this flag.
    pub mirrored: bool,
}

impl Frame {
    /// Bytes one row of visible pixels occupies
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Check that the buffer actually holds `height` rows of `stride` bytes
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let stride = self.stride as usize;
        if stride < self.row_bytes() {
            return false;
        }
        let needed = stride * (self.height as usize - 1) + self.row_bytes();
        self.data.len() >= needed
    }

    /// Size once rotated upright by `orientation`
    pub fn oriented_resolution(&self) -> Resolution {
        let resolution = Resolution::new(self.width, self.height);
        if self.orientation.is_landscape() {
            resolution.transposed()
        } else {
            resolution
        }
    }

    /// Convert to a frame with copied data so it can outlive its pool
    pub fn to_copied(&self) -> Self {
        let bytes: Arc<[u8]> = Arc::from(self.data.as_ref());
        Self {
            width: self.width,
            height: self.height,
            format: self.format,
            stride: self.stride,
            data: FrameData::Copied(bytes),
            position: self.position,
            sequence: self.sequence,
            timestamp_ns: self.timestamp_ns,
            captured_at: self.captured_at,
            orientation: self.orientation,
            mirrored: self.mirrored,
        }
    }
}

/// Reference-counted frame handle shared between slot, renderer and compositor
pub type SharedFrame = Arc<Frame>;

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No inputs attached
    #[default]
    Unconfigured,
    /// A configuration transaction is in progress
    Configuring,
    /// Inputs attached, not streaming
    Configured,
    /// Streaming frames
    Running,
    /// Stop in progress
    Stopping,
    /// Streaming ended; inputs remain attached and the session can restart
    Stopped,
}

impl SessionState {
    /// Whether inputs are attached
    pub fn is_configured(&self) -> bool {
        matches!(
            self,
            SessionState::Configured
                | SessionState::Running
                | SessionState::Stopping
                | SessionState::Stopped
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Unconfigured => write!(f, "unconfigured"),
            SessionState::Configuring => write!(f, "configuring"),
            SessionState::Configured => write!(f, "configured"),
            SessionState::Running => write!(f, "running"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why the platform took a running session away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptionReason {
    /// Another client grabbed the camera
    AnotherClient,
    /// The device disappeared or permission was revoked
    DeviceRevoked,
    /// The application moved to the background
    Backgrounded,
    /// The platform media services restarted
    MediaServicesReset,
}

impl std::fmt::Display for InterruptionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptionReason::AnotherClient => write!(f, "camera in use by another client"),
            InterruptionReason::DeviceRevoked => write!(f, "device revoked"),
            InterruptionReason::Backgrounded => write!(f, "application backgrounded"),
            InterruptionReason::MediaServicesReset => write!(f, "media services reset"),
        }
    }
}

/// Asynchronous notifications from the platform camera subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The running stream was stopped by the platform
    Interrupted(InterruptionReason),
    /// The platform would allow the stream to run again
    InterruptionEnded,
    /// A device appeared or disappeared
    DeviceAvailabilityChanged { device_id: String, available: bool },
}

/// Called on the hardware capture thread for every produced frame
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Called on a platform thread for session-level notifications
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Camera is held by another session or client
    DeviceBusy(String),
    /// The session refused to add the input/output pair
    AttachRejected(String),
    /// Streaming could not start or broke down
    StreamFailed(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::AttachRejected(msg) => write!(f, "Attach rejected: {}", msg),
            BackendError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_matches() {
        assert!(AspectPolicy::Ratio4x3.matches(Resolution::new(1440, 1080)));
        assert!(AspectPolicy::Ratio4x3.matches(Resolution::new(3024, 4032)));
        assert!(!AspectPolicy::Ratio4x3.matches(Resolution::new(1920, 1080)));
        assert!(AspectPolicy::Ratio16x9.matches(Resolution::new(1280, 720)));
        // 854x480 is the usual rounded 16:9
        assert!(AspectPolicy::Ratio16x9.matches(Resolution::new(854, 480)));
        assert!(AspectPolicy::Unconstrained.matches(Resolution::new(7, 3)));
        assert!(!AspectPolicy::Ratio1x1.matches(Resolution::new(0, 0)));
    }

    #[test]
    fn test_aspect_parse() {
        assert_eq!("4:3".parse::<AspectPolicy>(), Ok(AspectPolicy::Ratio4x3));
        assert_eq!("".parse::<AspectPolicy>(), Ok(AspectPolicy::Unconstrained));
        assert!("5:4".parse::<AspectPolicy>().is_err());
    }

    #[test]
    fn test_device_orientation_mapping() {
        assert_eq!(
            VideoOrientation::from_device(DeviceOrientation::LandscapeLeft),
            VideoOrientation::LandscapeRight
        );
        assert_eq!(
            VideoOrientation::from_device(DeviceOrientation::LandscapeRight),
            VideoOrientation::LandscapeLeft
        );
        assert_eq!(
            VideoOrientation::from_device(DeviceOrientation::FaceUp),
            VideoOrientation::Portrait
        );
    }

    #[test]
    fn test_orientation_codes_roundtrip_degrees() {
        assert_eq!(VideoOrientation::from_degrees(-90), VideoOrientation::LandscapeLeft);
        assert_eq!(VideoOrientation::from_degrees(450), VideoOrientation::LandscapeRight);
        let o = VideoOrientation::PortraitUpsideDown;
        assert_eq!(VideoOrientation::from_code(o.to_code()), o);
    }

    #[test]
    fn test_frame_well_formed() {
        let frame = Frame {
            width: 2,
            height: 2,
            format: PixelFormat::Bgra8,
            stride: 12,
            data: FrameData::Copied(Arc::from(vec![0u8; 20])),
            position: CameraPosition::Back,
            sequence: 0,
            timestamp_ns: 0,
            captured_at: Instant::now(),
            orientation: VideoOrientation::Portrait,
            mirrored: false,
        };
        // Last row needs only 8 of its 12 stride bytes
        assert!(frame.is_well_formed());

        let short = Frame {
            data: FrameData::Copied(Arc::from(vec![0u8; 19])),
            ..frame.to_copied()
        };
        assert!(!short.is_well_formed());
    }

    #[test]
    fn test_oriented_resolution_swaps_for_landscape() {
        let frame = Frame {
            width: 4,
            height: 2,
            format: PixelFormat::Bgra8,
            stride: 16,
            data: FrameData::Copied(Arc::from(vec![0u8; 32])),
            position: CameraPosition::Back,
            sequence: 0,
            timestamp_ns: 0,
            captured_at: Instant::now(),
            orientation: VideoOrientation::LandscapeRight,
            mirrored: false,
        };
        assert_eq!(frame.oriented_resolution(), Resolution::new(2, 4));

        let upside_down = Frame {
            orientation: VideoOrientation::PortraitUpsideDown,
            ..frame.to_copied()
        };
        assert_eq!(upside_down.oriented_resolution(), Resolution::new(4, 2));
    }

    #[test]
    fn test_position_parse() {
        assert_eq!("Rear".parse::<CameraPosition>(), Ok(CameraPosition::Back));
        assert_eq!(
            "ultrawide".parse::<CameraPosition>(),
            Ok(CameraPosition::UltraWide)
        );
    }
}
