// SPDX-License-Identifier: GPL-3.0-only

//! Frame recording fed from the capture callback
//!
//! The capture thread never waits on the recorder: frames go through a
//! bounded channel with `try_send`, and anything that does not fit is counted
//! as dropped. A dedicated writer thread drains the channel into a
//! [`RecordingSink`], which owns the actual container encoding.

use crate::backends::camera::types::{Frame, SharedFrame};
use crate::errors::RecordingError;
use crate::pipelines::photo::capture::frame_to_oriented_rgba;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Destination for recorded frames
pub trait RecordingSink: Send + 'static {
    /// Consume one frame, in capture order
    fn write_frame(&mut self, frame: &Frame) -> Result<(), String>;

    /// Finalize output once the last frame was written
    fn finish(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Writes every frame as a numbered JPEG file
pub struct ImageSequenceSink {
    dir: PathBuf,
    quality: u8,
    written: u64,
}

impl ImageSequenceSink {
    pub fn new(dir: PathBuf, quality: u8) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quality,
            written: 0,
        })
    }
}

impl RecordingSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), String> {
        let image = frame_to_oriented_rgba(frame).map_err(|e| e.to_string())?;
        let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();
        let path = self.dir.join(format!("frame_{:06}.jpg", self.written));
        let file = std::fs::File::create(&path).map_err(|e| e.to_string())?;
        let mut writer = std::io::BufWriter::new(file);
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, self.quality);
        rgb.write_with_encoder(encoder).map_err(|e| e.to_string())?;
        self.written += 1;
        trace!(path = %path.display(), "Wrote recorded frame");
        Ok(())
    }
}

/// What a finished recording produced
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordingSummary {
    pub frames_written: u64,
    /// Frames the writer could not keep up with
    pub frames_dropped: u64,
    pub first_timestamp_ns: Option<u64>,
    pub last_timestamp_ns: Option<u64>,
    /// Wall-clock time between start and stop
    pub duration: Duration,
}

/// Capture-side end of an active recording
pub struct RecordingTap {
    sender: mpsc::Sender<SharedFrame>,
    started_at: Instant,
    max_duration: Option<Duration>,
    dropped: Arc<AtomicU64>,
}

impl RecordingTap {
    /// Queue a copy of `frame` for the writer; never blocks
    pub fn forward(&self, frame: &Frame) {
        if self
            .max_duration
            .is_some_and(|max| self.started_at.elapsed() > max)
        {
            return;
        }
        // Reserve first so a full queue costs no copy. Queued frames are
        // copied so they do not hold hardware buffers.
        match self.sender.try_reserve() {
            Ok(permit) => permit.send(Arc::new(frame.to_copied())),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(sequence = frame.sequence, "Recorder lagging, frame dropped");
            }
        }
    }
}

/// Shared recording sender.
///
/// Lives in the session (not inside any stream) so it survives camera
/// switches and is reachable from both the capture thread and the
/// recording start/stop code.
pub type SharedRecordingSender = Arc<Mutex<Option<RecordingTap>>>;

/// Hand `frame` to the active recording, if any
pub fn forward_frame(shared: &SharedRecordingSender, frame: &Frame) {
    if let Ok(guard) = shared.lock()
        && let Some(tap) = guard.as_ref()
    {
        tap.forward(frame);
    }
}

#[derive(Default)]
struct WriterStats {
    frames: u64,
    first_ts: Option<u64>,
    last_ts: Option<u64>,
}

/// Writer side of an active recording
pub struct FrameRecorder {
    writer: Option<JoinHandle<Result<WriterStats, RecordingError>>>,
    dropped: Arc<AtomicU64>,
    started_at: Instant,
}

impl FrameRecorder {
    /// Spawn the writer thread; frames reach it through the returned tap
    pub fn start<S: RecordingSink>(
        mut sink: S,
        capacity: usize,
        max_duration: Option<Duration>,
    ) -> Result<(Self, RecordingTap), RecordingError> {
        let (sender, mut receiver) = mpsc::channel::<SharedFrame>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let started_at = Instant::now();

        let writer = std::thread::Builder::new()
            .name("frame-recorder".to_string())
            .spawn(move || {
                let mut stats = WriterStats::default();
                while let Some(frame) = receiver.blocking_recv() {
                    if let Err(e) = sink.write_frame(&frame) {
                        error!(error = %e, "Recording sink rejected frame");
                        return Err(RecordingError::SinkFailed(e));
                    }
                    stats.frames += 1;
                    stats.first_ts.get_or_insert(frame.timestamp_ns);
                    stats.last_ts = Some(frame.timestamp_ns);
                }
                sink.finish().map_err(RecordingError::SinkFailed)?;
                Ok(stats)
            })
            .map_err(|e| RecordingError::SinkFailed(format!("spawn writer: {}", e)))?;

        info!(capacity, ?max_duration, "Recording started");

        let tap = RecordingTap {
            sender,
            started_at,
            max_duration,
            dropped: Arc::clone(&dropped),
        };
        Ok((
            Self {
                writer: Some(writer),
                dropped,
                started_at,
            },
            tap,
        ))
    }

    /// Wait for the writer to drain; the tap must already be gone
    pub fn finish(mut self) -> Result<RecordingSummary, RecordingError> {
        let writer = self.writer.take().ok_or(RecordingError::NotRecording)?;
        let stats = writer
            .join()
            .map_err(|_| RecordingError::SinkFailed("writer thread panicked".to_string()))??;

        let summary = RecordingSummary {
            frames_written: stats.frames,
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            first_timestamp_ns: stats.first_ts,
            last_timestamp_ns: stats.last_ts,
            duration: self.started_at.elapsed(),
        };
        info!(
            frames = summary.frames_written,
            dropped = summary.frames_dropped,
            "Recording finished"
        );
        Ok(summary)
    }
}

/// Start/stop bookkeeping shared by the session coordinators
#[derive(Default)]
pub struct RecordingController {
    sender: SharedRecordingSender,
    recorder: Mutex<Option<FrameRecorder>>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender handle for the capture callback
    pub fn sender(&self) -> SharedRecordingSender {
        Arc::clone(&self.sender)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }

    pub fn start<S: RecordingSink>(
        &self,
        sink: S,
        capacity: usize,
        max_duration: Option<Duration>,
    ) -> Result<(), RecordingError> {
        let mut recorder = self.recorder.lock().unwrap_or_else(|e| e.into_inner());
        if recorder.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let (new_recorder, tap) = FrameRecorder::start(sink, capacity, max_duration)?;
        *self.sender.lock().unwrap_or_else(|e| e.into_inner()) = Some(tap);
        *recorder = Some(new_recorder);
        Ok(())
    }

    pub fn stop(&self) -> Result<RecordingSummary, RecordingError> {
        let recorder = self
            .recorder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(RecordingError::NotRecording)?;
        // Dropping the tap closes the channel so the writer can drain and exit
        let tap = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(tap);
        debug!("Recording tap closed, waiting for writer");
        recorder.finish()
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if self.is_recording() {
            warn!("Session dropped while recording, finalizing");
            if let Err(e) = self.stop() {
                warn!(error = %e, "Failed to finalize recording");
            }
        }
    }
}
