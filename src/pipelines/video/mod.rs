// SPDX-License-Identifier: GPL-3.0-only

//! Video recording pipeline
//!
//! Frames leave the capture callback through a bounded channel and are
//! written by a dedicated thread into a caller-supplied sink, so recording
//! never slows down preview.

pub mod recorder;

pub use recorder::{
    FrameRecorder, ImageSequenceSink, RecordingController, RecordingSink, RecordingSummary,
    SharedRecordingSender, forward_frame,
};
