// SPDX-License-Identifier: GPL-3.0-only

//! Still image pipeline
//!
//! ```text
//! FrameSlot(s) → Capture / Composite → Encoding → byte buffer
//!       ↓
//! Preview continues uninterrupted
//! ```
//!
//! - [`capture`]: single-camera stills from the latest slot frame
//! - [`composite`]: dual-camera picture-in-picture stills
//! - [`encoding`]: JPEG/PNG byte buffers

pub mod capture;
pub mod composite;
pub mod encoding;

pub use capture::{PhotoCapture, frame_to_oriented_rgba, frame_to_rgba, orient_image};
pub use composite::{
    CompositeCompletion, CompositeImage, CompositeRequest, Compositor, OverlayRect,
    PendingRequests, PipCorner, PipLayout, compose,
};
pub use encoding::{EncodedImage, EncodingFormat, EncodingQuality, PhotoEncoder};
