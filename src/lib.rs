// SPDX-License-Identifier: GPL-3.0-only

//! Camera Preview - concurrent camera capture, preview rendering and compositing
//!
//! This library runs one camera, or the front and back cameras together,
//! hands their frames to a display-clock driven renderer and merges the two
//! streams into picture-in-picture stills on demand.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera hardware abstraction and the virtual backend
//! - [`session`]: Session coordinators, frame slots and the session queue
//! - [`render`]: Texture cache, filters, display surfaces and render pipeline
//! - [`pipelines`]: Photo (still, composite, encoding) and video recording
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use camera_preview::backends::camera::{AspectPolicy, CameraPosition, VirtualBackend};
//! use camera_preview::session::{CaptureSessionCoordinator, SessionOptions};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(VirtualBackend::new());
//! let session = CaptureSessionCoordinator::new(backend, SessionOptions::default())?;
//! session.configure(CameraPosition::Back, 1080, AspectPolicy::Ratio4x3)?;
//! session.start()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod render;
pub mod session;

// Re-export commonly used types
pub use backends::camera::{CameraBackend, CameraPosition, Frame, SessionState, VirtualBackend};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use render::{RenderPipeline, SoftwareSurface};
pub use session::{CaptureSessionCoordinator, DualCaptureSessionCoordinator, FrameSlot};
