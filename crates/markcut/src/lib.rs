//! Commercial break marking for broadcast recordings.
//!
//! [`Analyzer`] drives one recording end to end: it loads the channel's logo
//! mask (learning and storing one on first contact), records logo start and
//! stop markers, then moves each stop/start pair onto content repeated
//! around the break. [`Settings`] layers a `markcut.toml` over the built-in
//! defaults.

pub mod analyzer;
pub mod settings;

pub use analyzer::{
    AnalysisReport, Analyzer, AnalyzerError, AnalyzerResult, LogoStatus, MaskOrigin,
};
pub use settings::{ConfigError, Settings};

pub use markcut_decoder as decoder;
pub use markcut_logo as logo;
pub use markcut_overlap as overlap;
pub use markcut_types as types;
