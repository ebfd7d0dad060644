use std::fmt;
use std::ops::Range;

use markcut_types::Picture;

/// Upper bound of [`Histogram::distance`].
pub const HISTOGRAM_DISTANCE_LIMIT: u32 = i32::MAX as u32;

/// Similarity verdict together with the distance it was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Similarity {
    pub similar: bool,
    pub distance: u32,
}

/// 256-bin luma histogram over the middle band of a picture.
#[derive(Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: [u32; 256],
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied = self.bins.iter().filter(|&&count| count > 0).count();
        f.debug_struct("Histogram")
            .field("total", &self.total())
            .field("occupied_bins", &occupied)
            .finish()
    }
}

impl Histogram {
    pub fn from_bins(bins: [u32; 256]) -> Self {
        Self { bins }
    }

    /// Rows sampled for a picture `height` rows tall: `[20%, 80%)`.
    pub fn band(height: u32) -> Range<u32> {
        height / 5..height * 4 / 5
    }

    pub fn of_picture(picture: &Picture) -> Self {
        let luma = picture.luma();
        let mut bins = [0u32; 256];
        for y in Self::band(luma.height()) {
            for &value in luma.row(y) {
                bins[value as usize] += 1;
            }
        }
        Self { bins }
    }

    pub fn bins(&self) -> &[u32; 256] {
        &self.bins
    }

    /// Number of pixels counted.
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&count| count as u64).sum()
    }

    /// Sum of absolute per-bin differences, saturating at
    /// [`HISTOGRAM_DISTANCE_LIMIT`].
    pub fn distance(&self, other: &Histogram) -> u32 {
        self.bins
            .iter()
            .zip(&other.bins)
            .fold(0u32, |acc, (&a, &b)| acc.saturating_add(a.abs_diff(b)))
            .min(HISTOGRAM_DISTANCE_LIMIT)
    }

    /// Similar when the distance stays below `cutoff`.
    pub fn compare(&self, other: &Histogram, cutoff: u32) -> Similarity {
        let distance = self.distance(other);
        Similarity {
            similar: distance < cutoff,
            distance,
        }
    }
}
