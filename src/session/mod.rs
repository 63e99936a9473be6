// SPDX-License-Identifier: GPL-3.0-only

//! Capture session coordination
//!
//! ```text
//!   caller ──configure/start/stop──▶ SessionQueue (serial worker)
//!                                          │
//!                                          ▼
//!                                    CameraBackend
//!                                          │ capture thread
//!                                          ▼
//!                                    FrameSlot(s) ──▶ renderer / stills
//! ```
//!
//! [`CaptureSessionCoordinator`] drives one camera, and
//! [`DualCaptureSessionCoordinator`] drives front and back together.

pub mod coordinator;
pub mod dual;
pub mod frame_slot;
pub mod queue;
pub mod resolution;

pub use coordinator::{CaptureSessionCoordinator, SessionOptions};
pub use dual::DualCaptureSessionCoordinator;
pub use frame_slot::FrameSlot;
pub use queue::SessionQueue;
pub use resolution::{ResolutionRequest, negotiate_resolution};
