use std::time::Duration;

use markcut_decoder::FrameIndex;
use markcut_types::{Marker, MarkerKind, MarkerType};
use tracing::debug;

use crate::buffer::FixedBuffer;
use crate::config::OverlapConfig;
use crate::error::OverlapResult;
use crate::search::HistogramSample;

/// Approximate boundaries of one break: content stops at `stop_position`
/// and resumes at `start_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPair {
    pub stop_position: u64,
    pub stop_type: MarkerType,
    pub start_position: u64,
    pub start_type: MarkerType,
}

impl BreakPair {
    /// Every stop marker directly followed by a start marker.
    pub fn collect<'a>(markers: impl IntoIterator<Item = &'a Marker>) -> Vec<BreakPair> {
        let markers: Vec<&Marker> = markers.into_iter().collect();
        markers
            .windows(2)
            .filter_map(|pair| match (pair[0].marker_type.kind, pair[1].marker_type.kind) {
                (MarkerKind::Stop, MarkerKind::Start) => Some(BreakPair {
                    stop_position: pair[0].position,
                    stop_type: pair[0].marker_type,
                    start_position: pair[1].position,
                    start_type: pair[1].marker_type,
                }),
                _ => None,
            })
            .collect()
    }
}

/// Inclusive frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub start: u64,
    pub end: u64,
}

impl SearchWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, frame: u64) -> bool {
        (self.start..=self.end).contains(&frame)
    }
}

/// The two ranges searched for one break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairWindows {
    pub before: SearchWindow,
    pub after: SearchWindow,
}

impl PairWindows {
    /// Full span the refined markers must stay inside.
    pub fn span(&self) -> SearchWindow {
        SearchWindow::new(self.before.start, self.after.end)
    }
}

/// Histograms buffered for one refinement attempt. Capacities are fixed at
/// creation from the expected key frame counts.
#[derive(Debug)]
pub struct OverlapWindow {
    pub before: FixedBuffer<HistogramSample>,
    pub after: FixedBuffer<HistogramSample>,
}

impl OverlapWindow {
    pub fn new(before_capacity: usize, after_capacity: usize) -> Self {
        Self {
            before: FixedBuffer::with_capacity(before_capacity),
            after: FixedBuffer::with_capacity(after_capacity),
        }
    }
}

/// Computes the search windows of consecutive breaks. Each window is first
/// laid out on its own, then cut back so it does not reach into the raw
/// window of a neighbouring break. `None` marks a break with no room left.
pub fn plan_windows(
    pairs: &[BreakPair],
    index: &dyn FrameIndex,
    config: &OverlapConfig,
) -> OverlapResult<Vec<Option<PairWindows>>> {
    let span = index.frames_in(Duration::from_secs_f64(config.search_window));
    let raw = pairs
        .iter()
        .map(|pair| {
            let before_start = index.key_frame_before(pair.stop_position.saturating_sub(span))?;
            Ok(PairWindows {
                before: SearchWindow::new(before_start, pair.stop_position),
                after: SearchWindow::new(
                    pair.start_position,
                    pair.start_position.saturating_add(span),
                ),
            })
        })
        .collect::<OverlapResult<Vec<_>>>()?;

    let planned = raw
        .iter()
        .enumerate()
        .map(|(idx, windows)| {
            let pair = &pairs[idx];
            if pair.start_position <= pair.stop_position {
                debug!(
                    stop = pair.stop_position,
                    start = pair.start_position,
                    "break ends before it starts"
                );
                return None;
            }
            let mut windows = *windows;
            if let Some(prev) = idx.checked_sub(1).map(|prev| raw[prev]) {
                windows.before.start = windows.before.start.max(prev.after.end.saturating_add(1));
            }
            if let Some(next) = raw.get(idx + 1) {
                match next.before.start.checked_sub(1) {
                    Some(limit) => windows.after.end = windows.after.end.min(limit),
                    None => return None,
                }
            }
            if windows.before.is_empty() || windows.after.is_empty() {
                debug!(
                    stop = pair.stop_position,
                    start = pair.start_position,
                    "no room left between neighbouring breaks"
                );
                return None;
            }
            Some(windows)
        })
        .collect();
    Ok(planned)
}
