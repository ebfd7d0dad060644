use markcut_types::{CancelToken, Cancelled};

use crate::histogram::Histogram;

/// Histogram of one buffered key frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSample {
    pub frame_number: u64,
    pub histogram: Histogram,
    /// Cleared when the picture geometry differs from the window's first
    /// sample; invalid samples never match.
    pub valid: bool,
}

/// Boundaries of a run of matching samples, as frame numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapRun {
    pub before_start: u64,
    pub before_end: u64,
    pub after_start: u64,
    pub after_end: u64,
    pub duration_secs: f64,
    pub max_distance: u32,
}

/// Parameters of one run search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSearch {
    pub frame_rate: f64,
    /// Distance below which two samples are similar.
    pub cutoff: u32,
    pub min_run_secs: f64,
    pub probe_range: usize,
}

impl RunSearch {
    fn similarity(&self, a: &HistogramSample, b: &HistogramSample) -> Option<u32> {
        if !a.valid || !b.valid {
            return None;
        }
        let similarity = a.histogram.compare(&b.histogram, self.cutoff);
        similarity.similar.then_some(similarity.distance)
    }

    fn seconds(&self, from: u64, to: u64) -> f64 {
        to.saturating_sub(from) as f64 / self.frame_rate
    }

    /// Longest run of pairwise similar samples that lasts at least
    /// `min_run_secs`. A later run replaces the best only when strictly
    /// longer.
    pub fn longest_run(
        &self,
        before: &[HistogramSample],
        after: &[HistogramSample],
        cancel: &CancelToken,
    ) -> Result<Option<OverlapRun>, Cancelled> {
        let mut best: Option<OverlapRun> = None;
        for (i, first) in before.iter().enumerate() {
            for (j, _) in after.iter().enumerate() {
                cancel.check()?;
                let Some(distance) = self.similarity(first, &after[j]) else {
                    continue;
                };
                let (end_i, end_j, max_distance) = self.follow(before, after, i, j, distance);
                let run = OverlapRun {
                    before_start: first.frame_number,
                    before_end: before[end_i].frame_number,
                    after_start: after[j].frame_number,
                    after_end: after[end_j].frame_number,
                    duration_secs: self.seconds(first.frame_number, before[end_i].frame_number),
                    max_distance,
                };
                if run.duration_secs < self.min_run_secs {
                    continue;
                }
                if best.is_none_or(|best| run.duration_secs > best.duration_secs) {
                    best = Some(run);
                }
            }
        }
        Ok(best)
    }

    /// Extends a run starting at (`i`, `j`) for as long as consecutive pairs
    /// stay similar. Once the run is long enough, a miss is bridged by probing
    /// up to `probe_range` samples ahead on either side.
    fn follow(
        &self,
        before: &[HistogramSample],
        after: &[HistogramSample],
        i: usize,
        j: usize,
        distance: u32,
    ) -> (usize, usize, u32) {
        let (mut bi, mut aj, mut max_distance) = (i, j, distance);
        loop {
            let next = (bi + 1, aj + 1);
            if next.0 >= before.len() || next.1 >= after.len() {
                break;
            }
            if let Some(distance) = self.similarity(&before[next.0], &after[next.1]) {
                (bi, aj) = next;
                max_distance = max_distance.max(distance);
                continue;
            }
            if self.seconds(before[i].frame_number, before[bi].frame_number) < self.min_run_secs {
                break;
            }
            let probe = (0..=self.probe_range)
                .flat_map(|di| (0..=self.probe_range).map(move |dj| (di, dj)))
                .filter(|&offset| offset != (0, 0))
                .map(|(di, dj)| (next.0 + di, next.1 + dj))
                .filter(|&(pi, pj)| pi < before.len() && pj < after.len())
                .find_map(|(pi, pj)| {
                    self.similarity(&before[pi], &after[pj])
                        .map(|distance| (pi, pj, distance))
                });
            match probe {
                Some((pi, pj, distance)) => {
                    (bi, aj) = (pi, pj);
                    max_distance = max_distance.max(distance);
                }
                None => break,
            }
        }
        (bi, aj, max_distance)
    }
}
