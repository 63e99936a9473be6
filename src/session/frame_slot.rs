// SPDX-License-Identifier: GPL-3.0-only

//! Latest-frame cell shared between a capture callback and its readers
//!
//! The slot holds at most one frame. `publish` replaces it, `peek` hands out
//! another reference to it. The lock is held only for the pointer swap or
//! clone, so a reader can take as long as it likes with the returned handle
//! while the capture thread keeps publishing.

use crate::backends::camera::types::{CameraPosition, Frame, SharedFrame};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

#[derive(Default)]
struct SlotState {
    frame: Option<SharedFrame>,
    /// Number of publishes since creation, survives `clear`
    generation: u64,
}

/// Single-frame, overwrite-on-arrival cell for one camera stream
pub struct FrameSlot {
    position: CameraPosition,
    state: Mutex<SlotState>,
}

impl FrameSlot {
    pub fn new(position: CameraPosition) -> Self {
        Self {
            position,
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Camera this slot belongs to
    pub fn position(&self) -> CameraPosition {
        self.position
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panicking reader must not stall the capture thread
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `frame`, dropping the previous occupant. Returns the new generation.
    pub fn publish(&self, frame: Frame) -> u64 {
        self.publish_shared(Arc::new(frame))
    }

    /// Store an already shared frame
    pub fn publish_shared(&self, frame: SharedFrame) -> u64 {
        let (previous, generation) = {
            let mut state = self.lock();
            state.generation += 1;
            (state.frame.replace(frame), state.generation)
        };
        // Released outside the lock so buffer recycling never extends the hold
        drop(previous);
        trace!(position = %self.position, generation, "Frame published");
        generation
    }

    /// Current frame, if any has arrived
    pub fn peek(&self) -> Option<SharedFrame> {
        self.lock().frame.clone()
    }

    /// Current frame together with the generation it was published at
    pub fn peek_with_generation(&self) -> Option<(SharedFrame, u64)> {
        let state = self.lock();
        state.frame.clone().map(|f| (f, state.generation))
    }

    /// Number of publishes so far
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Release the held frame
    pub fn clear(&self) -> Option<SharedFrame> {
        let previous = self.lock().frame.take();
        if previous.is_some() {
            trace!(position = %self.position, "Frame slot cleared");
        }
        previous
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frame.is_none()
    }
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FrameSlot")
            .field("position", &self.position)
            .field("generation", &state.generation)
            .field("sequence", &state.frame.as_ref().map(|fr| fr.sequence))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{FrameData, PixelFormat, VideoOrientation};
    use std::time::Instant;

    fn frame(sequence: u64) -> Frame {
        Frame {
            width: 1,
            height: 1,
            format: PixelFormat::Bgra8,
            stride: 4,
            data: FrameData::Copied(Arc::from(vec![sequence as u8; 4])),
            position: CameraPosition::Back,
            sequence,
            timestamp_ns: sequence,
            captured_at: Instant::now(),
            orientation: VideoOrientation::Portrait,
            mirrored: false,
        }
    }

    #[test]
    fn test_empty_slot() {
        let slot = FrameSlot::new(CameraPosition::Back);
        assert!(slot.peek().is_none());
        assert!(slot.is_empty());
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn test_overwrite_releases_previous() {
        let slot = FrameSlot::new(CameraPosition::Back);
        slot.publish(frame(1));
        let first = slot.peek().unwrap();
        let weak = Arc::downgrade(&first);
        drop(first);

        slot.publish(frame(2));
        assert!(weak.upgrade().is_none(), "old frame still alive");
        assert_eq!(slot.peek().unwrap().sequence, 2);
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn test_peek_handle_outlives_overwrite() {
        let slot = FrameSlot::new(CameraPosition::Front);
        slot.publish(frame(7));
        let held = slot.peek().unwrap();
        slot.publish(frame(8));
        assert_eq!(held.sequence, 7);
        assert_eq!(held.data[0], 7);
    }

    #[test]
    fn test_clear() {
        let slot = FrameSlot::new(CameraPosition::Back);
        slot.publish(frame(1));
        assert!(slot.clear().is_some());
        assert!(slot.peek().is_none());
        assert!(slot.clear().is_none());
        assert_eq!(slot.generation(), 1);
    }
}
