use std::sync::Arc;
use std::time::Duration;

use markcut_types::{Picture, Plane};
use tracing::trace;

use crate::config::Configuration;
use crate::core::{
    Decoder, FrameIndex, FrameResult, MemoryIndex, RecordingProgress, SharedFrameIndex, Source,
};

/// Produces the picture for a frame number.
pub type PictureGenerator = Arc<dyn Fn(u64) -> FrameResult<Picture> + Send + Sync>;

/// Decoder over generated pictures. Availability follows the shared
/// [`RecordingProgress`], so tests can simulate a recording that is still
/// being written.
pub struct SyntheticDecoder {
    generator: PictureGenerator,
    index: Arc<MemoryIndex>,
    position: u64,
    current: Option<u64>,
}

impl SyntheticDecoder {
    pub fn new(index: Arc<MemoryIndex>, generator: PictureGenerator) -> Self {
        Self {
            generator,
            index,
            position: 0,
            current: None,
        }
    }

    /// Moving luma gradient with neutral chroma.
    pub fn gradient(width: u32, height: u32, index: Arc<MemoryIndex>) -> Self {
        let generator: PictureGenerator = Arc::new(move |frame| {
            let stride = width as usize;
            let mut luma = vec![0u8; stride * height as usize];
            for (row, chunk) in luma.chunks_mut(stride).enumerate() {
                chunk.fill(((row as u64 + frame) % 256) as u8);
            }
            let luma = Plane::from_owned(width, height, stride, luma)?;
            let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
            Picture::new(luma, frame)
                .with_chroma(Plane::filled(cw, ch, 128), Plane::filled(cw, ch, 128))
        });
        Self::new(index, generator)
    }

    pub fn index(&self) -> Arc<MemoryIndex> {
        Arc::clone(&self.index)
    }
}

impl Decoder for SyntheticDecoder {
    fn next_picture(&mut self) -> FrameResult<Option<Picture>> {
        if self.position >= self.index.indexed_frames() {
            return Ok(None);
        }
        let frame = self.position;
        let picture = (self.generator)(frame)?
            .with_frame_number(frame)
            .with_key_frame(self.index.is_key_frame(frame))
            .with_timestamp(Some(Duration::from_secs_f64(
                frame as f64 / self.index.frame_rate(),
            )));
        trace!(frame, key = picture.is_key_frame(), "synthetic picture");
        self.position += 1;
        self.current = Some(frame);
        Ok(Some(picture))
    }

    fn seek(&mut self, frame_number: u64) -> FrameResult<bool> {
        if frame_number >= self.index.indexed_frames() {
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

pub(crate) fn open_synthetic(config: &Configuration) -> FrameResult<Source> {
    let progress = RecordingProgress::finished(config.frames);
    let index = Arc::new(MemoryIndex::new(config.frame_rate, config.gop, progress));
    let decoder = SyntheticDecoder::gradient(config.width, config.height, Arc::clone(&index));
    let index: SharedFrameIndex = index;
    Ok(Source {
        decoder: Box::new(decoder),
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(progress: RecordingProgress) -> SyntheticDecoder {
        let index = Arc::new(MemoryIndex::new(25.0, 12, progress));
        SyntheticDecoder::gradient(64, 36, index)
    }

    #[test]
    fn emits_frames_with_key_flags() {
        let mut decoder = decoder(RecordingProgress::finished(30));
        let first = decoder.next_picture().unwrap().unwrap();
        assert_eq!(first.frame_number(), 0);
        assert!(first.is_key_frame());
        assert!(first.has_chroma());
        let second = decoder.next_picture().unwrap().unwrap();
        assert!(!second.is_key_frame());
        assert_eq!(second.luma().pixel(0, 0), 1);
        assert_eq!(decoder.current_frame_number(), Some(1));
    }

    #[test]
    fn seek_repositions_and_rejects_unavailable_frames() {
        let mut decoder = decoder(RecordingProgress::finished(30));
        assert!(decoder.seek(24).unwrap());
        let picture = decoder.next_picture().unwrap().unwrap();
        assert_eq!(picture.frame_number(), 24);
        assert!(picture.is_key_frame());
        assert!(!decoder.seek(30).unwrap());
    }

    #[test]
    fn runs_dry_until_the_recording_grows() {
        let progress = RecordingProgress::live(2);
        let mut decoder = decoder(progress.clone());
        assert!(decoder.next_picture().unwrap().is_some());
        assert!(decoder.next_picture().unwrap().is_some());
        assert!(decoder.next_picture().unwrap().is_none());
        progress.grow(1);
        let picture = decoder.next_picture().unwrap().unwrap();
        assert_eq!(picture.frame_number(), 2);
    }
}
