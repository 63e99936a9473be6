// SPDX-License-Identifier: GPL-3.0-only

//! Error types for session configuration, capture and recording

use crate::backends::camera::types::{
    AspectPolicy, CameraPosition, InterruptionReason, SessionState,
};
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result of a configuration transaction (`configure`, `switch_camera`, dual `setup`)
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result of a start/stop request
pub type SessionResult<T> = Result<T, SessionError>;

/// Result of a still or composite capture
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Umbrella error surfaced to the host collaborator
#[derive(Debug, Clone)]
pub enum AppError {
    /// Session configuration errors
    Config(ConfigError),
    /// Session lifecycle errors
    Session(SessionError),
    /// Still/composite capture errors
    Capture(CaptureError),
    /// Recording errors
    Recording(RecordingError),
    /// Settings file could not be read or parsed
    Settings(String),
    /// Storage/filesystem errors
    Storage(String),
}

/// Errors raised while selecting devices or attaching inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No enumerated device matches the requested position
    DeviceUnavailable(CameraPosition),
    /// No preset satisfies both the size target and the aspect policy
    UnsupportedResolution { target: u32, aspect: AspectPolicy },
    /// Attaching an input/output failed mid-transaction; the previous
    /// configuration has already been restored
    AttachFailed(String),
    /// The hardware cannot run two cameras under one session
    MultiCamUnsupported,
    /// The operation is not valid in the current lifecycle state
    InvalidState(SessionState),
}

/// Errors raised while starting, stopping or running a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `start` was called before a successful configuration
    NotConfigured,
    /// The hardware refused to start streaming
    StartFailed(String),
    /// The platform took the session away (another app, device revoked, backgrounded)
    Interrupted(InterruptionReason),
    /// The session queue worker is gone
    QueueClosed,
}

/// Errors raised by still capture and dual compositing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Capture requested before the slot received any frame
    NoFrameAvailable,
    /// The session stopped while the request was in flight
    SessionStopped,
    /// Merging or converting the frames failed
    CompositionFailed(String),
    /// Encoding to a byte buffer failed
    EncodingFailed(String),
}

/// Errors raised by the frame recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// Recording already in progress
    AlreadyRecording,
    /// Stop requested without an active recording
    NotRecording,
    /// The caller-provided sink rejected a frame or failed to finish
    SinkFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Session(e) => write!(f, "Session error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Settings(msg) => write!(f, "Settings error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DeviceUnavailable(position) => {
                write!(f, "No {} camera available", position)
            }
            ConfigError::UnsupportedResolution { target, aspect } => {
                write!(f, "No preset of at least {}p with aspect {}", target, aspect)
            }
            ConfigError::AttachFailed(msg) => write!(f, "Attach failed: {}", msg),
            ConfigError::MultiCamUnsupported => {
                write!(f, "Concurrent dual camera capture not supported")
            }
            ConfigError::InvalidState(state) => {
                write!(f, "Operation not allowed while session is {}", state)
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotConfigured => write!(f, "Session is not configured"),
            SessionError::StartFailed(msg) => write!(f, "Failed to start session: {}", msg),
            SessionError::Interrupted(reason) => write!(f, "Session interrupted: {}", reason),
            SessionError::QueueClosed => write!(f, "Session queue is closed"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoFrameAvailable => write!(f, "No frame available for capture"),
            CaptureError::SessionStopped => write!(f, "Session stopped before capture completed"),
            CaptureError::CompositionFailed(msg) => write!(f, "Composition failed: {}", msg),
            CaptureError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::AlreadyRecording => write!(f, "Recording already in progress"),
            RecordingError::NotRecording => write!(f, "No recording in progress"),
            RecordingError::SinkFailed(msg) => write!(f, "Recording sink failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for SessionError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for RecordingError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Settings(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::EncodingFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_resolution_message() {
        let err = ConfigError::UnsupportedResolution {
            target: 1080,
            aspect: AspectPolicy::Ratio4x3,
        };
        assert_eq!(err.to_string(), "No preset of at least 1080p with aspect 4:3");
    }

    #[test]
    fn test_wraps_into_app_error() {
        let err: AppError = CaptureError::NoFrameAvailable.into();
        assert!(matches!(err, AppError::Capture(CaptureError::NoFrameAvailable)));
        assert_eq!(
            err.to_string(),
            "Capture error: No frame available for capture"
        );
    }
}
