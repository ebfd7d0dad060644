use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

pub use markcut_types::{FrameError, FrameResult, Picture};

/// Pull-based picture source. One call returns one decoded picture; the
/// returned planes are owned and stay valid after the next call.
pub trait Decoder: Send {
    /// Returns `Ok(None)` when no further picture is available right now. For a
    /// recording that is still being written this is not the end of input.
    fn next_picture(&mut self) -> FrameResult<Option<Picture>>;

    /// Positions the decoder so the next picture is `frame_number`. Returns
    /// `false` when that frame is not available.
    fn seek(&mut self, frame_number: u64) -> FrameResult<bool>;

    /// Frame number of the most recently returned picture.
    fn current_frame_number(&self) -> Option<u64>;
}

pub type DynDecoder = Box<dyn Decoder>;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("frame {frame} is not indexed yet ({indexed} frames available)")]
    NotIndexed { frame: u64, indexed: u64 },

    #[error("frame {frame} lies beyond the end of the recording ({indexed} frames)")]
    OutOfRange { frame: u64, indexed: u64 },
}

/// Frame number to time and key frame lookups.
pub trait FrameIndex: Send + Sync {
    fn frame_rate(&self) -> f64;

    fn time_of_frame(&self, frame: u64) -> IndexResult<Duration>;

    fn frame_at_time(&self, time: Duration) -> IndexResult<u64>;

    /// Closest key frame at or before `frame`.
    fn key_frame_before(&self, frame: u64) -> IndexResult<u64>;

    /// Closest key frame at or after `frame`.
    fn key_frame_after(&self, frame: u64) -> IndexResult<u64>;

    /// Number of key frames in the inclusive range `from..=to`.
    fn key_frames_between(&self, from: u64, to: u64) -> IndexResult<usize>;

    /// Frames currently available to the decoder.
    fn indexed_frames(&self) -> u64;

    /// Whether the producer is still appending to the recording.
    fn is_recording(&self) -> bool;

    fn last_frame(&self) -> Option<u64> {
        self.indexed_frames().checked_sub(1)
    }

    /// Frame count covering `span` at the index frame rate.
    fn frames_in(&self, span: Duration) -> u64 {
        (span.as_secs_f64() * self.frame_rate()).round().max(0.0) as u64
    }
}

pub type SharedFrameIndex = Arc<dyn FrameIndex>;

/// An opened recording: the decoder plus the index describing it.
pub struct Source {
    pub decoder: DynDecoder,
    pub index: SharedFrameIndex,
}

/// Shared counter of available frames, written by the producer of a live
/// recording and read by its index.
#[derive(Debug, Clone)]
pub struct RecordingProgress {
    frames: Arc<AtomicU64>,
    recording: Arc<AtomicBool>,
}

impl RecordingProgress {
    pub fn live(frames: u64) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(frames)),
            recording: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn finished(frames: u64) -> Self {
        let progress = Self::live(frames);
        progress.finish();
        progress
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn grow(&self, by: u64) {
        self.frames.fetch_add(by, Ordering::AcqRel);
    }

    pub fn finish(&self) {
        self.recording.store(false, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }
}

/// Constant frame rate with a key frame every `gop` frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GopLayout {
    pub frame_rate: f64,
    pub gop: u64,
}

impl GopLayout {
    pub fn new(frame_rate: f64, gop: u64) -> Self {
        Self {
            frame_rate,
            gop: gop.max(1),
        }
    }

    pub fn is_key_frame(&self, frame: u64) -> bool {
        frame % self.gop == 0
    }

    fn check(frame: u64, indexed: u64, recording: bool) -> IndexResult<u64> {
        if frame < indexed {
            Ok(frame)
        } else if recording {
            Err(IndexError::NotIndexed { frame, indexed })
        } else {
            Err(IndexError::OutOfRange { frame, indexed })
        }
    }

    pub fn time_of_frame(&self, frame: u64, indexed: u64, recording: bool) -> IndexResult<Duration> {
        let frame = Self::check(frame, indexed, recording)?;
        Ok(Duration::from_secs_f64(frame as f64 / self.frame_rate))
    }

    pub fn frame_at_time(&self, time: Duration, indexed: u64, recording: bool) -> IndexResult<u64> {
        let frame = (time.as_secs_f64() * self.frame_rate).floor() as u64;
        Self::check(frame, indexed, recording)
    }

    pub fn key_frame_before(&self, frame: u64, indexed: u64, recording: bool) -> IndexResult<u64> {
        let frame = Self::check(frame, indexed, recording)?;
        Ok(frame - frame % self.gop)
    }

    pub fn key_frame_after(&self, frame: u64, indexed: u64, recording: bool) -> IndexResult<u64> {
        let key = frame.div_ceil(self.gop) * self.gop;
        Self::check(key, indexed, recording)
    }

    pub fn key_frames_between(
        &self,
        from: u64,
        to: u64,
        indexed: u64,
        recording: bool,
    ) -> IndexResult<usize> {
        let to = Self::check(to, indexed, recording)?;
        if from > to {
            return Ok(0);
        }
        let upto_to = to / self.gop + 1;
        let below_from = if from == 0 { 0 } else { (from - 1) / self.gop + 1 };
        Ok((upto_to - below_from) as usize)
    }
}

/// In-memory index for constant frame rate material with a fixed GOP length.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    layout: GopLayout,
    progress: RecordingProgress,
}

impl MemoryIndex {
    pub fn new(frame_rate: f64, gop: u64, progress: RecordingProgress) -> Self {
        Self {
            layout: GopLayout::new(frame_rate, gop),
            progress,
        }
    }

    pub fn progress(&self) -> &RecordingProgress {
        &self.progress
    }

    pub fn gop(&self) -> u64 {
        self.layout.gop
    }

    pub fn is_key_frame(&self, frame: u64) -> bool {
        self.layout.is_key_frame(frame)
    }
}

impl FrameIndex for MemoryIndex {
    fn frame_rate(&self) -> f64 {
        self.layout.frame_rate
    }

    fn time_of_frame(&self, frame: u64) -> IndexResult<Duration> {
        self.layout
            .time_of_frame(frame, self.progress.frames(), self.progress.is_recording())
    }

    fn frame_at_time(&self, time: Duration) -> IndexResult<u64> {
        self.layout
            .frame_at_time(time, self.progress.frames(), self.progress.is_recording())
    }

    fn key_frame_before(&self, frame: u64) -> IndexResult<u64> {
        self.layout
            .key_frame_before(frame, self.progress.frames(), self.progress.is_recording())
    }

    fn key_frame_after(&self, frame: u64) -> IndexResult<u64> {
        self.layout
            .key_frame_after(frame, self.progress.frames(), self.progress.is_recording())
    }

    fn key_frames_between(&self, from: u64, to: u64) -> IndexResult<usize> {
        self.layout.key_frames_between(
            from,
            to,
            self.progress.frames(),
            self.progress.is_recording(),
        )
    }

    fn indexed_frames(&self) -> u64 {
        self.progress.frames()
    }

    fn is_recording(&self) -> bool {
        self.progress.is_recording()
    }
}
