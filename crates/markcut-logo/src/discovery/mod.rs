//! Learns a logo mask from a recording without prior labelling.
//!
//! Key frames are sampled until every screen corner holds a bounded number of
//! plausible candidates. For every sample and corner an edge map is computed,
//! checked for plausibility, and voted against every candidate already
//! retained for that corner. The most popular corner wins, is cropped to the
//! logo's extent, and becomes the mask.

mod candidate;
mod crop;
mod sanity;
mod voting;

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use markcut_decoder::{Availability, Decoder, FrameIndex, StallPolicy};
use markcut_types::{AspectRatio, CancelToken, Corner, Picture, Region};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::border::{BorderConfig, BorderDetector, BorderEvent};
use crate::dump::DebugDump;
use crate::error::{LogoError, LogoResult};
use crate::mask::LogoMask;
use crate::sobel::{EdgePlane, SobelTransform};

pub use candidate::{Agreement, Candidate, CandidateStorage, PackedPlane, StorageKind, StorageKindParseError};
pub use crop::crop;
pub use voting::{CandidateMatcher, MutualVoting};

use sanity::{SanityLimits, plausible_logo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Plausible candidates to collect per corner before selecting.
    pub max_samples: u32,
    /// Hard cap on decoded frames, sampled or not.
    pub max_read_frames: u64,
    /// Luma agreement a pair must exceed to match.
    pub luma_match_rate: f32,
    /// Chroma agreement a pair must exceed to match.
    pub chroma_match_rate: f32,
    pub min_hits: u32,
    /// Lower bar for a corner holding `dominant_share` of all hits.
    pub dominant_min_hits: u32,
    pub dominant_share: f32,
    /// Lower bar for a dominant corner when the recording ended early.
    pub partial_min_hits: u32,
    /// Second-best corner is considered when it has this share of the
    /// winner's hits.
    pub second_best_share: f32,
    /// Crops keeping more than this share of the width are rejected, except
    /// bottom-left.
    pub max_crop_width_share: f32,
    pub sanity_strip: u32,
    pub sanity_inner_search: u32,
    pub min_candidate_edges: u32,
    /// Rows (columns) with at most `size / divisor` edges are trimmed.
    pub crop_tolerance_divisor: u32,
    pub stall_retries: u32,
    pub stall_sleep_ms: u64,
    pub storage: StorageKind,
    /// Corner region width as a fraction `[num, den]` of the picture width.
    pub region_width: [u32; 2],
    /// Corner region height as a fraction `[num, den]` of the picture height.
    pub region_height: [u32; 2],
    pub border: BorderConfig,
    pub dump_dir: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            max_read_frames: 15_000,
            luma_match_rate: 0.86,
            chroma_match_rate: 0.985,
            min_hits: 50,
            dominant_min_hits: 25,
            dominant_share: 0.9,
            partial_min_hits: 15,
            second_best_share: 0.7,
            max_crop_width_share: 0.9,
            sanity_strip: 10,
            sanity_inner_search: 8,
            min_candidate_edges: 8,
            crop_tolerance_divisor: 100,
            stall_retries: 6,
            stall_sleep_ms: 10_000,
            storage: StorageKind::Unpacked,
            region_width: [192, 720],
            region_height: [100, 576],
            border: BorderConfig::default(),
            dump_dir: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn stall_policy(&self) -> StallPolicy {
        StallPolicy::new(self.stall_retries, Duration::from_millis(self.stall_sleep_ms))
    }

    /// Corner region for a picture of `width`x`height`, rounded down to even.
    pub fn region_for(&self, corner: Corner, width: u32, height: u32) -> LogoResult<Region> {
        let scale = |size: u32, [num, den]: [u32; 2]| -> u32 {
            let scaled = size as u64 * num as u64 / den.max(1) as u64;
            (scaled.min(size as u64) as u32) & !1
        };
        Ok(Region::new(
            corner,
            scale(width, self.region_width),
            scale(height, self.region_height),
        )?)
    }
}

/// A learned mask and the evidence behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredLogo {
    pub mask: LogoMask,
    pub hits: u32,
    /// Frame the mask was taken from.
    pub frame_number: u64,
    /// Candidates retained for the mask's corner.
    pub samples: u32,
    /// Key frames of the target aspect ratio that were sampled.
    pub key_frames: u32,
    /// The recording ended before every corner reached its quota.
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// No key frame could be sampled.
    NoSamples,
    /// Every candidate failed the plausibility checks.
    NoCandidates,
    /// The best corner did not collect enough votes.
    BelowThreshold { corner: Corner, hits: u32 },
    /// Every eligible corner produced an unusable crop.
    CropRejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryOutcome {
    Found(DiscoveredLogo),
    NotFound(NotFoundReason),
}

impl DiscoveryOutcome {
    pub fn mask(&self) -> Option<&LogoMask> {
        match self {
            DiscoveryOutcome::Found(found) => Some(&found.mask),
            DiscoveryOutcome::NotFound(_) => None,
        }
    }
}

/// State of one discovery pass.
struct Pass {
    /// Retained candidates per corner, in frame order.
    pools: [Vec<Candidate>; 4],
    key_frames: u32,
    frames_read: u64,
    ended_early: bool,
    aspect_ratio: Option<AspectRatio>,
    border: BorderDetector,
}

impl Pass {
    fn is_full(&self, corner: Corner, max_samples: u32) -> bool {
        self.pools[corner.index()].len() as u64 >= max_samples as u64
    }

    fn quota_reached(&self, max_samples: u32) -> bool {
        Corner::ALL
            .into_iter()
            .all(|corner| self.is_full(corner, max_samples))
    }

    fn pool_sizes(&self) -> [usize; 4] {
        [0, 1, 2, 3].map(|idx| self.pools[idx].len())
    }
}

pub struct LogoDiscoverer {
    config: DiscoveryConfig,
    sobel: SobelTransform,
    matcher: Box<dyn CandidateMatcher>,
    excluded: Vec<RangeInclusive<u64>>,
    target_aspect: Option<AspectRatio>,
}

impl LogoDiscoverer {
    pub fn new(config: DiscoveryConfig, sobel: SobelTransform) -> Self {
        let matcher = Box::new(MutualVoting::new(
            config.luma_match_rate,
            config.chroma_match_rate,
        ));
        Self {
            config,
            sobel,
            matcher,
            excluded: Vec::new(),
            target_aspect: None,
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn CandidateMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Samples only pictures of `aspect_ratio` instead of the first sampled
    /// picture's.
    pub fn with_target_aspect(mut self, aspect_ratio: AspectRatio) -> Self {
        self.target_aspect = Some(aspect_ratio);
        self
    }

    /// Skips a frame range known to be inside a picture border.
    pub fn exclude(&mut self, frames: RangeInclusive<u64>) {
        self.excluded.push(frames);
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Reads the decoder forward from its current position and selects a
    /// mask. Nothing is persisted here.
    pub fn run(
        &self,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> LogoResult<DiscoveryOutcome> {
        let stall = self.config.stall_policy();
        let mut pass = Pass {
            pools: Default::default(),
            key_frames: 0,
            frames_read: 0,
            ended_early: false,
            aspect_ratio: self.target_aspect,
            border: BorderDetector::new(self.config.border),
        };
        let mut next_frame = decoder.current_frame_number().map_or(0, |frame| frame + 1);
        // Highest availability already waited for, so a decoder that lags
        // behind the index cannot spin on the same growth.
        let mut watermark = next_frame;
        info!(
            matcher = self.matcher.name(),
            storage = %self.config.storage,
            first_frame = next_frame,
            "logo discovery started"
        );

        while !pass.quota_reached(self.config.max_samples)
            && pass.frames_read < self.config.max_read_frames
        {
            cancel.check()?;
            let Some(picture) = decoder.next_picture()? else {
                match stall.wait_for_growth(index, watermark.max(next_frame), cancel)? {
                    Availability::Grew(available) => {
                        watermark = available;
                        continue;
                    }
                    Availability::Ended => {
                        pass.ended_early = true;
                        break;
                    }
                    Availability::Stalled => {
                        return Err(LogoError::Stalled { frame: next_frame });
                    }
                }
            };
            next_frame = picture.frame_number() + 1;
            pass.frames_read += 1;
            self.sample(&mut pass, &picture, cancel)?;
        }

        info!(
            key_frames = pass.key_frames,
            samples = ?pass.pool_sizes(),
            frames_read = pass.frames_read,
            ended_early = pass.ended_early,
            "logo discovery sampling finished"
        );
        self.select(&pass)
    }

    fn sample(&self, pass: &mut Pass, picture: &Picture, cancel: &CancelToken) -> LogoResult<()> {
        let frame = picture.frame_number();
        if let Some(BorderEvent::Started { kind, first_frame }) = pass.border.observe(picture) {
            debug!(?kind, first_frame, "picture border started");
            self.purge_from(pass, first_frame, cancel)?;
        }
        if pass.border.is_active() || self.excluded.iter().any(|range| range.contains(&frame)) {
            return Ok(());
        }
        if !picture.is_key_frame() {
            return Ok(());
        }
        let target = *pass.aspect_ratio.get_or_insert(picture.aspect_ratio());
        if picture.aspect_ratio() != target {
            return Ok(());
        }

        pass.key_frames += 1;
        let limits = SanityLimits {
            strip: self.config.sanity_strip,
            inner_search: self.config.sanity_inner_search,
            boundary: self.sobel.config().boundary,
            min_edges: self.config.min_candidate_edges,
        };
        for corner in Corner::ALL {
            if pass.is_full(corner, self.config.max_samples) {
                continue;
            }
            let region = self
                .config
                .region_for(corner, picture.width(), picture.height())?;
            let map = self.sobel.transform(picture, region, true)?;
            if !plausible_logo(map.luma(), corner, &limits) {
                continue;
            }
            let mut candidate = Candidate::new(frame, map, self.config.storage);
            let pool = &mut pass.pools[corner.index()];
            self.matcher.vote(pool, &mut candidate, cancel)?;
            pool.push(candidate);
        }
        Ok(())
    }

    /// Drops every candidate taken at or after `first_frame` together with
    /// the hits it gave to the candidates that remain.
    fn purge_from(
        &self,
        pass: &mut Pass,
        first_frame: u64,
        cancel: &CancelToken,
    ) -> LogoResult<()> {
        let mut purged = 0;
        for pool in &mut pass.pools {
            let keep = pool.partition_point(|candidate| candidate.frame_number < first_frame);
            let dropped = pool.split_off(keep);
            for gone in &dropped {
                for survivor in pool.iter_mut() {
                    cancel.check()?;
                    if self.matcher.is_match(survivor, gone) {
                        survivor.hits = survivor.hits.saturating_sub(1);
                    }
                }
            }
            purged += dropped.len();
        }
        if purged > 0 {
            debug!(first_frame, purged, "dropped candidates inside picture border");
        }
        Ok(())
    }

    fn select(&self, pass: &Pass) -> LogoResult<DiscoveryOutcome> {
        if pass.key_frames == 0 {
            return Ok(DiscoveryOutcome::NotFound(NotFoundReason::NoSamples));
        }
        let mut bests: Vec<(Corner, &Candidate)> = Corner::ALL
            .into_iter()
            .filter_map(|corner| {
                let pool = &pass.pools[corner.index()];
                // Earliest candidate wins ties.
                let best = pool.iter().fold(None::<&Candidate>, |best, candidate| match best {
                    Some(best) if best.hits >= candidate.hits => Some(best),
                    _ => Some(candidate),
                })?;
                Some((corner, best))
            })
            .collect();
        bests.sort_by(|a, b| b.1.hits.cmp(&a.1.hits));
        for (corner, best) in &bests {
            debug!(%corner, hits = best.hits, frame = best.frame_number, "best corner candidate");
        }
        let Some(&(corner, winner)) = bests.first() else {
            return Ok(DiscoveryOutcome::NotFound(NotFoundReason::NoCandidates));
        };
        let aspect_ratio = pass.aspect_ratio.unwrap_or_default();
        let dump = self.config.dump_dir.as_ref().map(DebugDump::new);
        if let Some(dump) = &dump {
            for (corner, best) in &bests {
                dump.candidate(*corner, best.frame_number, best.hits, &best.storage.to_planes());
            }
        }

        let total: u32 = bests.iter().map(|(_, best)| best.hits).sum();
        let accepts = |hits: u32| {
            let dominant = hits as f32 >= self.config.dominant_share * total as f32;
            hits >= self.config.min_hits
                || (dominant && hits >= self.config.dominant_min_hits)
                || (dominant && pass.ended_early && hits >= self.config.partial_min_hits)
        };
        if !accepts(winner.hits) {
            info!(%corner, hits = winner.hits, total, "no corner collected enough votes");
            return Ok(DiscoveryOutcome::NotFound(NotFoundReason::BelowThreshold {
                corner,
                hits: winner.hits,
            }));
        }

        let second = bests.get(1).copied();
        let (corner, chosen, planes) = match self.crop_candidate(corner, winner) {
            Some(planes) => {
                let narrower = second
                    .filter(|(_, second)| {
                        second.hits as f32 >= self.config.second_best_share * winner.hits as f32
                    })
                    .and_then(|(second_corner, second)| {
                        self.crop_candidate(second_corner, second)
                            .filter(|cropped| cropped[0].width() < planes[0].width())
                            .map(|cropped| (second_corner, second, cropped))
                    });
                match narrower {
                    Some(preferred) => {
                        info!(winner = %corner, preferred = %preferred.0, "narrower runner-up preferred");
                        preferred
                    }
                    None => (corner, winner, planes),
                }
            }
            None => {
                let fallback = second
                    .filter(|(_, second)| accepts(second.hits))
                    .and_then(|(second_corner, second)| {
                        self.crop_candidate(second_corner, second)
                            .map(|cropped| (second_corner, second, cropped))
                    });
                let Some(next) = fallback else {
                    info!(%corner, "crop rejected for the best and second-best corners");
                    return Ok(DiscoveryOutcome::NotFound(NotFoundReason::CropRejected));
                };
                info!(winner = %corner, fallback = %next.0, "winner crop rejected, next-best corner used");
                next
            }
        };

        let mask = LogoMask::new(corner, aspect_ratio, planes)?;
        if let Some(dump) = &dump {
            dump.mask(&mask);
        }
        info!(
            %corner,
            hits = chosen.hits,
            frame = chosen.frame_number,
            width = mask.width(),
            height = mask.height(),
            partial = pass.ended_early,
            "logo found"
        );
        Ok(DiscoveryOutcome::Found(DiscoveredLogo {
            mask,
            hits: chosen.hits,
            frame_number: chosen.frame_number,
            samples: pass.pools[corner.index()].len() as u32,
            key_frames: pass.key_frames,
            partial: pass.ended_early,
        }))
    }

    fn crop_candidate(&self, corner: Corner, candidate: &Candidate) -> Option<Vec<EdgePlane>> {
        let planes = candidate.storage.to_planes();
        let original_width = planes.first()?.width();
        let Some(cropped) = crop(
            planes,
            corner,
            self.sobel.config().boundary,
            self.config.crop_tolerance_divisor,
        ) else {
            warn!(%corner, frame = candidate.frame_number, "candidate has no significant edges");
            return None;
        };
        let width = cropped[0].width();
        if corner != Corner::BottomLeft
            && width as f32 > self.config.max_crop_width_share * original_width as f32
        {
            debug!(%corner, width, original_width, "crop too wide, likely a ticker");
            return None;
        }
        Some(cropped)
    }
}
