use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use markcut_decoder::StallPolicy;
use markcut_types::FrameError;
use serde::{Deserialize, Serialize};

/// Compression family of the recording. Higher-motion codecs re-encode
/// repeated content with more noise and get a looser cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCodec {
    #[default]
    Mpeg2,
    H264,
    Hevc,
}

impl SourceCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCodec::Mpeg2 => "mpeg2",
            SourceCodec::H264 => "h264",
            SourceCodec::Hevc => "hevc",
        }
    }
}

impl fmt::Display for SourceCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCodec {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpeg2" | "mpeg-2" | "mpeg2video" => Ok(SourceCodec::Mpeg2),
            "h264" | "avc" => Ok(SourceCodec::H264),
            "hevc" | "h265" => Ok(SourceCodec::Hevc),
            other => Err(FrameError::configuration(format!(
                "unknown source codec '{other}'"
            ))),
        }
    }
}

/// Similarity cutoff per codec as a share of the sampled band's pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecCutoffs {
    pub mpeg2: f32,
    pub h264: f32,
    pub hevc: f32,
}

impl Default for CodecCutoffs {
    fn default() -> Self {
        Self {
            mpeg2: 0.14,
            h264: 0.20,
            hevc: 0.20,
        }
    }
}

impl CodecCutoffs {
    pub fn share(&self, codec: SourceCodec) -> f32 {
        match codec {
            SourceCodec::Mpeg2 => self.mpeg2,
            SourceCodec::H264 => self.h264,
            SourceCodec::Hevc => self.hevc,
        }
    }
}

/// Tuning of the overlap search. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    /// Span searched on each side of the break.
    pub search_window: f64,
    /// Shortest run that counts as an overlap.
    pub min_run: f64,
    /// Samples probed on each side to bridge a broken run.
    pub probe_range: usize,
    pub cutoffs: CodecCutoffs,
    /// Largest gap to the original markers when the start marker is strong.
    pub strong_max_gap: f64,
    pub weak_max_gap: f64,
    /// Weak runs shorter than this use `weak_short_max_gap`.
    pub weak_short_run: f64,
    pub weak_short_max_gap: f64,
    /// Runs at least this long use `long_run_max_gap` regardless of type.
    pub long_run: f64,
    pub long_run_max_gap: f64,
    pub stall_retries: u32,
    pub stall_sleep_ms: u64,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            search_window: 90.0,
            min_run: 4.0,
            probe_range: 2,
            cutoffs: CodecCutoffs::default(),
            strong_max_gap: 5.0,
            weak_max_gap: 18.0,
            weak_short_run: 8.0,
            weak_short_max_gap: 10.0,
            long_run: 25.0,
            long_run_max_gap: 40.0,
            stall_retries: 6,
            stall_sleep_ms: 10_000,
        }
    }
}

impl OverlapConfig {
    pub fn stall_policy(&self) -> StallPolicy {
        StallPolicy::new(self.stall_retries, Duration::from_millis(self.stall_sleep_ms))
    }

    /// Gap tolerance for a run of `run_secs` whose start marker is (not)
    /// strong.
    pub fn max_gap(&self, run_secs: f64, strong: bool) -> f64 {
        if run_secs >= self.long_run {
            self.long_run_max_gap
        } else if strong {
            self.strong_max_gap
        } else if run_secs < self.weak_short_run {
            self.weak_short_max_gap
        } else {
            self.weak_max_gap
        }
    }
}
