use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use markcut_types::{AspectRatio, FrameError, Picture, Plane};
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::core::{
    Decoder, FrameIndex, FrameResult, GopLayout, IndexResult, SharedFrameIndex, Source,
};

const BACKEND: &str = "raw-yuv";

/// Geometry of one planar I420 frame in the file.
#[derive(Debug, Clone, Copy)]
struct FrameLayout {
    width: u32,
    height: u32,
    chroma_width: u32,
    chroma_height: u32,
}

impl FrameLayout {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            chroma_width: width.div_ceil(2),
            chroma_height: height.div_ceil(2),
        }
    }

    fn luma_bytes(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn chroma_bytes(&self) -> usize {
        self.chroma_width as usize * self.chroma_height as usize
    }

    fn frame_bytes(&self) -> u64 {
        (self.luma_bytes() + 2 * self.chroma_bytes()) as u64
    }
}

/// Index over a headerless I420 file. Every frame is a key frame and the frame
/// count is re-read from the file length on every call, so a file that is
/// still growing reports its progress.
#[derive(Debug)]
pub struct RawYuvIndex {
    path: PathBuf,
    frame_bytes: u64,
    layout: GopLayout,
}

impl RawYuvIndex {
    fn new(path: PathBuf, frame_bytes: u64, frame_rate: f64) -> Self {
        Self {
            path,
            frame_bytes,
            layout: GopLayout::new(frame_rate, 1),
        }
    }
}

impl FrameIndex for RawYuvIndex {
    fn frame_rate(&self) -> f64 {
        self.layout.frame_rate
    }

    fn time_of_frame(&self, frame: u64) -> IndexResult<Duration> {
        self.layout.time_of_frame(frame, self.indexed_frames(), false)
    }

    fn frame_at_time(&self, time: Duration) -> IndexResult<u64> {
        self.layout.frame_at_time(time, self.indexed_frames(), false)
    }

    fn key_frame_before(&self, frame: u64) -> IndexResult<u64> {
        self.layout.key_frame_before(frame, self.indexed_frames(), false)
    }

    fn key_frame_after(&self, frame: u64) -> IndexResult<u64> {
        self.layout.key_frame_after(frame, self.indexed_frames(), false)
    }

    fn key_frames_between(&self, from: u64, to: u64) -> IndexResult<usize> {
        self.layout
            .key_frames_between(from, to, self.indexed_frames(), false)
    }

    fn indexed_frames(&self) -> u64 {
        match fs::metadata(&self.path) {
            Ok(meta) => meta.len() / self.frame_bytes,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to stat raw yuv input");
                0
            }
        }
    }

    fn is_recording(&self) -> bool {
        false
    }
}

pub struct RawYuvDecoder {
    file: File,
    layout: FrameLayout,
    aspect_ratio: AspectRatio,
    frame_rate: f64,
    position: u64,
    current: Option<u64>,
    buffer: Vec<u8>,
}

impl RawYuvDecoder {
    pub fn open(path: &Path, width: u32, height: u32, frame_rate: f64) -> FrameResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::configuration(
                "raw yuv input requires MARKCUT_WIDTH and MARKCUT_HEIGHT",
            ));
        }
        let file = File::open(path).map_err(|err| {
            FrameError::backend_failure(BACKEND, format!("failed to open {}: {err}", path.display()))
        })?;
        let layout = FrameLayout::new(width, height);
        debug!(path = %path.display(), width, height, frame_rate, "opened raw yuv input");
        Ok(Self {
            file,
            layout,
            aspect_ratio: AspectRatio::default(),
            frame_rate,
            position: 0,
            current: None,
            buffer: vec![0; layout.frame_bytes() as usize],
        })
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    fn split_planes(&self) -> FrameResult<(Plane, Plane, Plane)> {
        let layout = self.layout;
        let (luma, rest) = self.buffer.split_at(layout.luma_bytes());
        let (u, v) = rest.split_at(layout.chroma_bytes());
        let cw = layout.chroma_width;
        let ch = layout.chroma_height;
        Ok((
            Plane::from_owned(layout.width, layout.height, layout.width as usize, luma.to_vec())?,
            Plane::from_owned(cw, ch, cw as usize, u.to_vec())?,
            Plane::from_owned(cw, ch, cw as usize, v.to_vec())?,
        ))
    }
}

impl Decoder for RawYuvDecoder {
    fn next_picture(&mut self) -> FrameResult<Option<Picture>> {
        let offset = self.position * self.layout.frame_bytes();
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(&mut self.buffer) {
            Ok(()) => {}
            // A trailing partial frame may still be in the middle of being written.
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let (luma, u, v) = self.split_planes()?;
        let frame = self.position;
        let picture = Picture::new(luma, frame)
            .with_chroma(u, v)?
            .with_aspect_ratio(self.aspect_ratio)
            .with_timestamp(Some(Duration::from_secs_f64(frame as f64 / self.frame_rate)));
        self.position += 1;
        self.current = Some(frame);
        Ok(Some(picture))
    }

    fn seek(&mut self, frame_number: u64) -> FrameResult<bool> {
        let length = self.file.metadata()?.len();
        if frame_number >= length / self.layout.frame_bytes() {
            return Ok(false);
        }
        self.position = frame_number;
        self.current = None;
        Ok(true)
    }

    fn current_frame_number(&self) -> Option<u64> {
        self.current
    }
}

pub(crate) fn open_raw_yuv(config: &Configuration) -> FrameResult<Source> {
    let path = config
        .input
        .clone()
        .ok_or_else(|| FrameError::configuration("raw yuv backend requires MARKCUT_INPUT"))?;
    let decoder = RawYuvDecoder::open(&path, config.width, config.height, config.frame_rate)?;
    let frame_bytes = decoder.layout.frame_bytes();
    let index: SharedFrameIndex = Arc::new(RawYuvIndex::new(path, frame_bytes, config.frame_rate));
    Ok(Source {
        decoder: Box::new(decoder),
        index,
    })
}
