use std::path::PathBuf;

use markcut_types::{Cancelled, FrameError};
use thiserror::Error;

pub type LogoResult<T> = Result<T, LogoError>;

#[derive(Debug, Error)]
pub enum LogoError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("recording stopped growing at frame {frame} while still being written")]
    Stalled { frame: u64 },

    #[error("invalid logo mask: {reason}")]
    InvalidMask { reason: String },
}

impl LogoError {
    pub fn invalid_mask(reason: impl Into<String>) -> Self {
        Self::InvalidMask {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MaskIoError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a valid mask file: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

impl MaskIoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
