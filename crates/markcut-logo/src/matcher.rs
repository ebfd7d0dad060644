use markcut_types::{CancelToken, Marker, MarkerKind, MarkerSource, MarkerStore, MarkerType, Picture};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LogoResult;
use crate::mask::{LogoMask, MatchResult};
use crate::sobel::SobelTransform;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Ratio at or above which a frame counts as showing the logo.
    pub vmark: f32,
    /// Ratio below which a frame counts as logo-free.
    pub imark: f32,
    /// Consecutive visible frames needed to confirm a logo start.
    pub vmax_count: u32,
    /// Consecutive invisible frames needed to confirm a logo stop.
    pub imax_count: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            vmark: 0.8,
            imark: 0.15,
            vmax_count: 3,
            imax_count: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoState {
    Uninitialized,
    NoLogo,
    LogoPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Visible,
    Invisible,
}

/// A confirmed logo transition, placed at the first frame of its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub kind: MarkerKind,
    pub position: u64,
}

impl Transition {
    pub fn marker_type(&self) -> MarkerType {
        MarkerType {
            kind: self.kind,
            source: MarkerSource::Logo,
        }
    }
}

/// Outcome of processing one picture.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStep {
    pub result: MatchResult,
    pub transition: Option<Transition>,
}

/// Debounced logo presence detector.
pub struct LogoMatcher {
    config: MatcherConfig,
    sobel: SobelTransform,
    mask: LogoMask,
    state: LogoState,
    pending: Option<Signal>,
    count: u32,
    run_start: u64,
}

impl LogoMatcher {
    pub fn new(mask: LogoMask, config: MatcherConfig, sobel: SobelTransform) -> Self {
        Self {
            config,
            sobel,
            mask,
            state: LogoState::Uninitialized,
            pending: None,
            count: 0,
            run_start: 0,
        }
    }

    pub fn state(&self) -> LogoState {
        self.state
    }

    pub fn mask(&self) -> &LogoMask {
        &self.mask
    }

    /// Forgets the current state, e.g. after an aspect ratio change.
    pub fn reset(&mut self) {
        self.state = LogoState::Uninitialized;
        self.clear_run();
    }

    fn clear_run(&mut self) {
        self.pending = None;
        self.count = 0;
    }

    fn classify(&self, ratio: f32) -> Option<Signal> {
        if ratio >= self.config.vmark {
            Some(Signal::Visible)
        } else if ratio < self.config.imark {
            Some(Signal::Invisible)
        } else {
            None
        }
    }

    /// Advances the state machine by one frame.
    pub fn observe(&mut self, frame_number: u64, ratio: f32) -> Option<Transition> {
        let signal = self.classify(ratio);
        let wanted = match self.state {
            LogoState::NoLogo => Some(Signal::Visible),
            LogoState::LogoPresent => Some(Signal::Invisible),
            LogoState::Uninitialized => signal,
        };
        let Some(signal) = signal.filter(|s| Some(*s) == wanted) else {
            if self.count > 0 {
                debug!(frame_number, ratio, run = self.count, "logo run interrupted");
            }
            self.clear_run();
            return None;
        };

        if self.pending != Some(signal) {
            self.pending = Some(signal);
            self.count = 0;
        }
        if self.count == 0 {
            self.run_start = frame_number;
        }
        self.count += 1;

        let needed = match signal {
            Signal::Visible => self.config.vmax_count,
            Signal::Invisible => self.config.imax_count,
        };
        if self.count < needed.max(1) {
            return None;
        }

        let previous = self.state;
        let position = self.run_start;
        self.clear_run();
        let transition = match signal {
            Signal::Visible => {
                self.state = LogoState::LogoPresent;
                Some(Transition {
                    kind: MarkerKind::Start,
                    position,
                })
            }
            Signal::Invisible => {
                self.state = LogoState::NoLogo;
                // Nothing to stop when the recording begins without a logo.
                (previous == LogoState::LogoPresent).then_some(Transition {
                    kind: MarkerKind::Stop,
                    position,
                })
            }
        };
        debug!(frame_number, ?previous, state = ?self.state, "logo state confirmed");
        transition
    }

    /// Matches `picture` against the mask and records any confirmed
    /// transition in `store`.
    pub fn process(
        &mut self,
        picture: &Picture,
        store: &mut dyn MarkerStore,
        cancel: &CancelToken,
    ) -> LogoResult<MatchStep> {
        cancel.check()?;
        let map = self
            .sobel
            .transform(picture, self.mask.region(), self.mask.has_chroma())?;
        let result = self.mask.compare(&map)?;
        let transition = self.observe(picture.frame_number(), result.ratio);
        if let Some(transition) = transition {
            let marker = Marker {
                marker_type: transition.marker_type(),
                position: transition.position,
                comment: Some(format!(
                    "detected at frame {}, ratio {:.2}",
                    picture.frame_number(),
                    result.ratio
                )),
            };
            info!(
                position = marker.position,
                kind = %marker.marker_type,
                "logo transition"
            );
            store.add(marker.marker_type, marker.position, marker.comment);
        }
        Ok(MatchStep { result, transition })
    }
}
