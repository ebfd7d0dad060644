use std::path::Path;

use markcut_decoder::{Availability, Decoder, FrameIndex, Source, StallPolicy};
use markcut_logo::{
    DiscoveryOutcome, LogoDiscoverer, LogoError, LogoMask, LogoMatcher, MaskIoError,
    MaskRepository, NotFoundReason, SobelTransform,
};
use markcut_overlap::{BreakPair, OverlapError, OverlapOutcome, OverlapRefiner};
use markcut_types::{
    AspectRatio, CancelToken, Cancelled, Corner, FrameError, MarkerStore, Picture,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::settings::{ConfigError, Settings};

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Logo(#[from] LogoError),

    #[error(transparent)]
    Mask(#[from] MaskIoError),

    #[error(transparent)]
    Overlap(#[from] OverlapError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("recording stopped growing at frame {frame} while still being written")]
    Stalled { frame: u64 },

    #[error("recording contains no pictures")]
    EmptyRecording,
}

/// Where the logo mask of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOrigin {
    Loaded,
    Discovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoStatus {
    Active { origin: MaskOrigin, corner: Corner },
    /// Logo marking is disabled for this recording.
    Unavailable(NotFoundReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub aspect_ratio: AspectRatio,
    pub logo: LogoStatus,
    /// Pictures read by the matcher pass.
    pub frames_read: u64,
    pub logo_transitions: usize,
    pub refinements: Vec<(BreakPair, OverlapOutcome)>,
}

/// Runs the complete marking of one recording: mask lookup or discovery,
/// logo matching and overlap refinement.
pub struct Analyzer {
    settings: Settings,
}

impl Analyzer {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Builds an analyzer from the settings file lookup.
    pub fn load(config_path: Option<&Path>) -> AnalyzerResult<Self> {
        Ok(Self::new(Settings::load(config_path)?))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Opens the recording described by the decoder settings.
    pub fn open(&self) -> AnalyzerResult<Source> {
        Ok(self.settings.decoder.create_provider()?)
    }

    pub fn analyze(
        &self,
        source: &mut Source,
        store: &mut dyn MarkerStore,
        cancel: &CancelToken,
    ) -> AnalyzerResult<AnalysisReport> {
        let decoder = source.decoder.as_mut();
        let index = source.index.as_ref();
        let mut reader = FrameReader::new(self.settings.discovery.stall_policy());

        reader.rewind(decoder, index, cancel)?;
        let aspect_ratio = reader
            .next(decoder, index, cancel)?
            .ok_or(AnalyzerError::EmptyRecording)?
            .aspect_ratio();
        info!(channel = %self.settings.channel, aspect = %aspect_ratio, "analysis started");

        let (logo, mask) = self.logo_mask(aspect_ratio, &mut reader, decoder, index, cancel)?;
        let (frames_read, logo_transitions) = match mask {
            Some(mask) => self.mark_logo(mask, &mut reader, decoder, index, store, cancel)?,
            None => (0, 0),
        };

        let refiner = OverlapRefiner::new(self.settings.overlap.clone(), self.settings.codec);
        let refinements = refiner.refine_all(store, decoder, index, cancel)?;

        info!(
            frames_read,
            logo_transitions,
            breaks = refinements.len(),
            "analysis finished"
        );
        Ok(AnalysisReport {
            aspect_ratio,
            logo,
            frames_read,
            logo_transitions,
            refinements,
        })
    }

    /// Loads the stored mask for `aspect_ratio` or learns and stores a new
    /// one.
    fn logo_mask(
        &self,
        aspect_ratio: AspectRatio,
        reader: &mut FrameReader,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> AnalyzerResult<(LogoStatus, Option<LogoMask>)> {
        let repository = MaskRepository::new(&self.settings.mask_dir);
        if let Some(mask) = repository.load(&self.settings.channel, aspect_ratio)? {
            let status = LogoStatus::Active {
                origin: MaskOrigin::Loaded,
                corner: mask.corner(),
            };
            return Ok((status, Some(mask)));
        }

        reader.rewind(decoder, index, cancel)?;
        let discoverer = LogoDiscoverer::new(
            self.settings.discovery.clone(),
            SobelTransform::new(self.settings.sobel),
        )
        .with_target_aspect(aspect_ratio);
        match discoverer.run(decoder, index, cancel)? {
            DiscoveryOutcome::Found(found) => {
                repository.save(&self.settings.channel, &found.mask)?;
                let status = LogoStatus::Active {
                    origin: MaskOrigin::Discovered,
                    corner: found.mask.corner(),
                };
                Ok((status, Some(found.mask)))
            }
            DiscoveryOutcome::NotFound(reason) => {
                warn!(channel = %self.settings.channel, ?reason, "no logo found, logo marking disabled");
                Ok((LogoStatus::Unavailable(reason), None))
            }
        }
    }

    /// Matches every key frame against `mask`. Pictures of another aspect
    /// ratio are skipped and restart the matcher's debouncing.
    fn mark_logo(
        &self,
        mask: LogoMask,
        reader: &mut FrameReader,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        store: &mut dyn MarkerStore,
        cancel: &CancelToken,
    ) -> AnalyzerResult<(u64, usize)> {
        let aspect_ratio = mask.aspect_ratio();
        let mut matcher = LogoMatcher::new(
            mask,
            self.settings.matcher,
            SobelTransform::new(self.settings.sobel),
        );
        let mut frames_read = 0u64;
        let mut transitions = 0usize;
        let mut matching = true;

        reader.rewind(decoder, index, cancel)?;
        while let Some(picture) = reader.next(decoder, index, cancel)? {
            frames_read += 1;
            if picture.aspect_ratio() != aspect_ratio {
                if matching {
                    debug!(
                        frame = picture.frame_number(),
                        aspect = %picture.aspect_ratio(),
                        "aspect ratio changed, matcher paused"
                    );
                    matcher.reset();
                    matching = false;
                }
                continue;
            }
            matching = true;
            if !picture.is_key_frame() {
                continue;
            }
            if matcher.process(&picture, store, cancel)?.transition.is_some() {
                transitions += 1;
            }
        }
        Ok((frames_read, transitions))
    }
}

/// Sequential picture reader that waits while a recording is still growing.
struct FrameReader {
    stall: StallPolicy,
    next_frame: u64,
    watermark: u64,
}

impl FrameReader {
    fn new(stall: StallPolicy) -> Self {
        Self {
            stall,
            next_frame: 0,
            watermark: 0,
        }
    }

    /// Positions the decoder on the first frame, waiting for it to arrive.
    fn rewind(
        &mut self,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> AnalyzerResult<()> {
        loop {
            cancel.check()?;
            if decoder.seek(0)? {
                self.next_frame = 0;
                self.watermark = 0;
                return Ok(());
            }
            match self.stall.wait_for_growth(index, index.indexed_frames(), cancel)? {
                Availability::Grew(_) => continue,
                Availability::Ended => return Err(AnalyzerError::EmptyRecording),
                Availability::Stalled => return Err(AnalyzerError::Stalled { frame: 0 }),
            }
        }
    }

    /// Next picture, or `None` once the recording has ended.
    fn next(
        &mut self,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> AnalyzerResult<Option<Picture>> {
        loop {
            cancel.check()?;
            if let Some(picture) = decoder.next_picture()? {
                self.next_frame = picture.frame_number() + 1;
                return Ok(Some(picture));
            }
            match self
                .stall
                .wait_for_growth(index, self.watermark.max(self.next_frame), cancel)?
            {
                Availability::Grew(available) => self.watermark = available,
                Availability::Ended => return Ok(None),
                Availability::Stalled => {
                    return Err(AnalyzerError::Stalled {
                        frame: self.next_frame,
                    });
                }
            }
        }
    }
}
