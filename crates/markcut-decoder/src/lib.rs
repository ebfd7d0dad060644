pub mod backends;
pub mod config;
pub mod core;
pub mod live;

pub use backends::raw_yuv::{RawYuvDecoder, RawYuvIndex};
pub use backends::synthetic::{PictureGenerator, SyntheticDecoder};
pub use config::{Backend, Configuration};
pub use crate::core::{
    Decoder, DynDecoder, FrameError, FrameIndex, FrameResult, IndexError, IndexResult,
    MemoryIndex, Picture, RecordingProgress, SharedFrameIndex, Source,
};
pub use live::{Availability, StallPolicy};
