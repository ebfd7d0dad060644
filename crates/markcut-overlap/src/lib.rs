//! Break refinement by repeated content.
//!
//! Broadcasters often replay a few seconds of programme after a break. The
//! refiner buffers luma histograms of key frames on both sides of a break,
//! finds the longest run that appears on both sides and moves the stop and
//! start markers onto that run's ends.

pub mod buffer;
pub mod config;
pub mod error;
pub mod histogram;
pub mod refiner;
pub mod search;
pub mod window;

pub use buffer::FixedBuffer;
pub use config::{CodecCutoffs, OverlapConfig, SourceCodec};
pub use error::{OverlapError, OverlapResult};
pub use histogram::{HISTOGRAM_DISTANCE_LIMIT, Histogram, Similarity};
pub use refiner::{OverlapOutcome, OverlapRefiner};
pub use search::{HistogramSample, OverlapRun, RunSearch};
pub use window::{BreakPair, OverlapWindow, PairWindows, SearchWindow, plan_windows};
