use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FrameError, FrameResult, PlaneKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        }
    }

    pub fn is_top(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::TopRight)
    }

    pub fn is_left(self) -> bool {
        matches!(self, Corner::TopLeft | Corner::BottomLeft)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corner {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top-left" => Ok(Corner::TopLeft),
            "top-right" => Ok(Corner::TopRight),
            "bottom-left" => Ok(Corner::BottomLeft),
            "bottom-right" => Ok(Corner::BottomRight),
            other => Err(FrameError::configuration(format!("unknown corner '{other}'"))),
        }
    }
}

/// Luma-sized rectangle anchored to a screen corner. Both dimensions are even
/// so the chroma rectangle is exactly half of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    corner: Corner,
    width: u32,
    height: u32,
}

/// A region resolved against one concrete plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(corner: Corner, width: u32, height: u32) -> FrameResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidRegion {
                width,
                height,
                reason: "dimensions must be positive",
            });
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::InvalidRegion {
                width,
                height,
                reason: "dimensions must be even",
            });
        }
        Ok(Self {
            corner,
            width,
            height,
        })
    }

    pub fn corner(&self) -> Corner {
        self.corner
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size of the region inside the given plane.
    pub fn plane_size(&self, kind: PlaneKind) -> (u32, u32) {
        if kind.is_chroma() {
            (self.width / 2, self.height / 2)
        } else {
            (self.width, self.height)
        }
    }

    pub fn plane_pixels(&self, kind: PlaneKind) -> usize {
        let (w, h) = self.plane_size(kind);
        w as usize * h as usize
    }

    /// Resolves the corner anchor against a plane of the given dimensions.
    pub fn rect_in(&self, kind: PlaneKind, plane_width: u32, plane_height: u32) -> FrameResult<PlaneRect> {
        let (width, height) = self.plane_size(kind);
        if width > plane_width || height > plane_height {
            return Err(FrameError::RegionOutOfBounds {
                corner: self.corner,
                width,
                height,
                plane_width,
                plane_height,
            });
        }
        let x = if self.corner.is_left() { 0 } else { plane_width - width };
        let y = if self.corner.is_top() { 0 } else { plane_height - height };
        Ok(PlaneRect {
            x,
            y,
            width,
            height,
        })
    }
}
