//! Shared domain models for the markcut workspace.
//!
//! This crate centralizes the lightweight data structures passed between the
//! decoder, logo, overlap, and analyzer crates: decoded pictures and their
//! planes, corner-anchored regions, cut markers, and the cancellation token.
//! Keep it free of image-processing logic and heavy dependencies so every
//! crate can depend on it.

mod cancel;
mod geometry;
mod marks;
mod picture;

pub use cancel::{CancelToken, Cancelled};
pub use geometry::{Corner, PlaneRect, Region};
pub use marks::{
    MarkError, MarkList, Marker, MarkerKind, MarkerSource, MarkerStore, MarkerType, TypeMask,
};
pub use picture::{AspectRatio, PerPlane, Picture, Plane, PlaneKind};

use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("picture has no {plane} plane")]
    MissingPlane { plane: PlaneKind },

    #[error("invalid region {width}x{height}: {reason}")]
    InvalidRegion {
        width: u32,
        height: u32,
        reason: &'static str,
    },

    #[error(
        "region {width}x{height} anchored {corner} does not fit a {plane_width}x{plane_height} plane"
    )]
    RegionOutOfBounds {
        corner: Corner,
        width: u32,
        height: u32,
        plane_width: u32,
        plane_height: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }
}
