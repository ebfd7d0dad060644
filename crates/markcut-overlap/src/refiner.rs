use markcut_decoder::{Availability, Decoder, FrameIndex, StallPolicy};
use markcut_types::{CancelToken, MarkError, MarkerSource, MarkerStore};
use tracing::{debug, info, warn};

use crate::buffer::FixedBuffer;
use crate::config::{OverlapConfig, SourceCodec};
use crate::error::{OverlapError, OverlapResult};
use crate::histogram::Histogram;
use crate::search::{HistogramSample, OverlapRun, RunSearch};
use crate::window::{BreakPair, OverlapWindow, PairWindows, SearchWindow, plan_windows};

/// Result of refining one break. Only `Moved` touches the marker store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlapOutcome {
    Moved {
        stop_from: u64,
        stop_to: u64,
        start_from: u64,
        start_to: u64,
        run_secs: f64,
    },
    /// The search windows collapsed against a neighbouring break or the end
    /// of the recording.
    NoRoom,
    NoOverlap,
    /// A run was found but lies too far from the original markers.
    Rejected { gap_before: f64, gap_after: f64 },
}

/// Relocates stop/start pairs onto the boundaries of content repeated on
/// both sides of a break.
#[derive(Debug, Clone)]
pub struct OverlapRefiner {
    config: OverlapConfig,
    codec: SourceCodec,
}

/// Picture size shared by the samples of one attempt.
type Geometry = Option<(u32, u32)>;

impl OverlapRefiner {
    pub fn new(config: OverlapConfig, codec: SourceCodec) -> Self {
        Self { config, codec }
    }

    pub fn config(&self) -> &OverlapConfig {
        &self.config
    }

    pub fn codec(&self) -> SourceCodec {
        self.codec
    }

    /// Refines every stop marker directly followed by a start marker.
    pub fn refine_all(
        &self,
        store: &mut dyn MarkerStore,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> OverlapResult<Vec<(BreakPair, OverlapOutcome)>> {
        let pairs = BreakPair::collect(store.iter());
        let planned = plan_windows(&pairs, index, &self.config)?;
        info!(breaks = pairs.len(), codec = %self.codec, "overlap refinement started");
        let mut outcomes = Vec::with_capacity(pairs.len());
        for (pair, windows) in pairs.into_iter().zip(planned) {
            let outcome = self.refine(&pair, windows, store, decoder, index, cancel)?;
            outcomes.push((pair, outcome));
        }
        let moved = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, OverlapOutcome::Moved { .. }))
            .count();
        info!(breaks = outcomes.len(), moved, "overlap refinement finished");
        Ok(outcomes)
    }

    /// Refines one break within `windows` as produced by
    /// [`plan_windows`]. Markers are moved only once the whole search has
    /// completed, so cancellation never leaves half a pair moved.
    pub fn refine(
        &self,
        pair: &BreakPair,
        windows: Option<PairWindows>,
        store: &mut dyn MarkerStore,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> OverlapResult<OverlapOutcome> {
        let Some(mut windows) = windows else {
            return Ok(OverlapOutcome::NoRoom);
        };
        match self.await_window(windows.after, index, cancel)? {
            Some(after) => windows.after = after,
            None => {
                debug!(
                    start = pair.start_position,
                    "recording ends before the after window"
                );
                return Ok(OverlapOutcome::NoRoom);
            }
        }

        let mut window = OverlapWindow::new(
            index.key_frames_between(windows.before.start, windows.before.end)?,
            index.key_frames_between(windows.after.start, windows.after.end)?,
        );
        let stall = self.config.stall_policy();
        let mut geometry = None;
        self.fill(
            windows.before,
            &mut window.before,
            &mut geometry,
            decoder,
            index,
            &stall,
            cancel,
        )?;
        self.fill(
            windows.after,
            &mut window.after,
            &mut geometry,
            decoder,
            index,
            &stall,
            cancel,
        )?;

        let Some(reference) = window
            .before
            .iter()
            .chain(window.after.iter())
            .find(|sample| sample.valid)
        else {
            return Ok(OverlapOutcome::NoOverlap);
        };
        let cutoff = (self.config.cutoffs.share(self.codec) as f64
            * reference.histogram.total() as f64) as u32;
        let search = RunSearch {
            frame_rate: index.frame_rate(),
            cutoff,
            min_run_secs: self.config.min_run,
            probe_range: self.config.probe_range,
        };
        debug!(
            before = window.before.len(),
            after = window.after.len(),
            cutoff,
            "searching overlap"
        );
        let Some(run) = search.longest_run(&window.before, &window.after, cancel)? else {
            debug!(
                stop = pair.stop_position,
                start = pair.start_position,
                "no overlap found"
            );
            return Ok(OverlapOutcome::NoOverlap);
        };

        let frame_rate = index.frame_rate();
        let gap_before = (pair.stop_position - run.before_end) as f64 / frame_rate;
        let gap_after = (run.after_start - pair.start_position) as f64 / frame_rate;
        let max_gap = self
            .config
            .max_gap(run.duration_secs, pair.start_type.source.is_strong());
        if gap_before > max_gap || gap_after > max_gap {
            debug!(
                stop = pair.stop_position,
                start = pair.start_position,
                gap_before,
                gap_after,
                max_gap,
                "overlap too far from the break"
            );
            return Ok(OverlapOutcome::Rejected {
                gap_before,
                gap_after,
            });
        }

        cancel.check()?;
        self.commit(pair, &run, store)
    }

    fn commit(
        &self,
        pair: &BreakPair,
        run: &OverlapRun,
        store: &mut dyn MarkerStore,
    ) -> OverlapResult<OverlapOutcome> {
        for position in [pair.stop_position, pair.start_position] {
            if store.get(position).is_none() {
                return Err(MarkError::NotFound { position }.into());
            }
        }
        store.move_marker(
            pair.stop_position,
            run.before_end,
            pair.stop_type.with_source(MarkerSource::Overlap),
        )?;
        if let Err(err) = store.move_marker(
            pair.start_position,
            run.after_end,
            pair.start_type.with_source(MarkerSource::Overlap),
        ) {
            // Both markers move or neither does.
            store.move_marker(run.before_end, pair.stop_position, pair.stop_type)?;
            return Err(err.into());
        }
        info!(
            stop_from = pair.stop_position,
            stop_to = run.before_end,
            start_from = pair.start_position,
            start_to = run.after_end,
            run_secs = run.duration_secs,
            max_distance = run.max_distance,
            "markers moved onto overlap"
        );
        Ok(OverlapOutcome::Moved {
            stop_from: pair.stop_position,
            stop_to: run.before_end,
            start_from: pair.start_position,
            start_to: run.after_end,
            run_secs: run.duration_secs,
        })
    }

    /// Waits until the index covers `after`, cutting it back to the last
    /// frame once the recording has ended.
    fn await_window(
        &self,
        mut after: SearchWindow,
        index: &dyn FrameIndex,
        cancel: &CancelToken,
    ) -> OverlapResult<Option<SearchWindow>> {
        let stall = self.config.stall_policy();
        loop {
            if index.last_frame().is_some_and(|last| last >= after.end) {
                return Ok(Some(after));
            }
            if !index.is_recording() {
                break;
            }
            match stall.wait_for_growth(index, index.indexed_frames(), cancel)? {
                Availability::Grew(_) => continue,
                Availability::Ended => break,
                Availability::Stalled => {
                    return Err(OverlapError::Stalled {
                        frame: index.indexed_frames(),
                    });
                }
            }
        }
        let Some(last) = index.last_frame() else {
            return Ok(None);
        };
        after.end = after.end.min(last);
        Ok((!after.is_empty()).then_some(after))
    }

    /// Buffers the histogram of every key frame inside `range`.
    #[allow(clippy::too_many_arguments)]
    fn fill(
        &self,
        range: SearchWindow,
        buffer: &mut FixedBuffer<HistogramSample>,
        geometry: &mut Geometry,
        decoder: &mut dyn Decoder,
        index: &dyn FrameIndex,
        stall: &StallPolicy,
        cancel: &CancelToken,
    ) -> OverlapResult<()> {
        if !decoder.seek(range.start)? {
            return Err(OverlapError::Seek { frame: range.start });
        }
        let mut next_frame = range.start;
        let mut watermark = next_frame;
        while next_frame <= range.end {
            cancel.check()?;
            let Some(picture) = decoder.next_picture()? else {
                match stall.wait_for_growth(index, watermark.max(next_frame), cancel)? {
                    Availability::Grew(available) => {
                        watermark = available;
                        continue;
                    }
                    Availability::Ended => break,
                    Availability::Stalled => {
                        return Err(OverlapError::Stalled { frame: next_frame });
                    }
                }
            };
            let frame = picture.frame_number();
            next_frame = frame + 1;
            if !range.contains(frame) || !picture.is_key_frame() {
                continue;
            }
            let size = (picture.width(), picture.height());
            let valid = *geometry.get_or_insert(size) == size;
            if !valid {
                warn!(frame, width = size.0, height = size.1, "picture size changed inside window");
            }
            buffer.push(HistogramSample {
                frame_number: frame,
                histogram: Histogram::of_picture(&picture),
                valid,
            });
        }
        Ok(())
    }
}
