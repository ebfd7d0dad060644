use markcut_decoder::IndexError;
use markcut_types::{Cancelled, FrameError, MarkError};
use thiserror::Error;

pub type OverlapResult<T> = Result<T, OverlapError>;

#[derive(Debug, Error)]
pub enum OverlapError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Marker(#[from] MarkError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("decoder cannot seek to frame {frame}")]
    Seek { frame: u64 },

    #[error("recording stopped growing at frame {frame} while still being written")]
    Stalled { frame: u64 },
}
