use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FrameError, FrameResult};

/// Picture plane selector. Every per-plane array in the workspace is indexed
/// through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneKind {
    Luma,
    ChromaU,
    ChromaV,
}

pub type PerPlane<T> = [T; 3];

impl PlaneKind {
    pub const ALL: [PlaneKind; 3] = [PlaneKind::Luma, PlaneKind::ChromaU, PlaneKind::ChromaV];

    pub fn index(self) -> usize {
        match self {
            PlaneKind::Luma => 0,
            PlaneKind::ChromaU => 1,
            PlaneKind::ChromaV => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_chroma(self) -> bool {
        !matches!(self, PlaneKind::Luma)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlaneKind::Luma => "luma",
            PlaneKind::ChromaU => "chroma-u",
            PlaneKind::ChromaV => "chroma-v",
        }
    }
}

impl fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AspectRatio {
    pub num: u32,
    pub den: u32,
}

impl AspectRatio {
    pub const FOUR_THREE: AspectRatio = AspectRatio { num: 4, den: 3 };
    pub const SIXTEEN_NINE: AspectRatio = AspectRatio { num: 16, den: 9 };

    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// File-name friendly key, e.g. `16_9`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.num, self.den)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::SIXTEEN_NINE
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

/// One row-major byte plane. `stride` may exceed `width`.
#[derive(Clone)]
pub struct Plane {
    width: u32,
    height: u32,
    stride: usize,
    data: Arc<[u8]>,
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Plane {
    pub fn from_owned(width: u32, height: u32, stride: usize, data: Vec<u8>) -> FrameResult<Self> {
        if stride < width as usize {
            return Err(FrameError::invalid_frame(format!(
                "stride {stride} is smaller than width {width}"
            )));
        }
        let required = stride
            .checked_mul(height as usize)
            .ok_or_else(|| FrameError::invalid_frame("calculated plane length overflowed"))?;
        if data.len() < required {
            return Err(FrameError::invalid_frame(format!(
                "insufficient plane bytes: got {} expected at least {}",
                data.len(),
                required
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    /// Builds a tightly packed plane filled with `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            stride: width as usize,
            data: Arc::from(vec![value; width as usize * height as usize].into_boxed_slice()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.stride + x as usize]
    }
}

/// A decoded picture with one luma plane and optionally two half-resolution
/// chroma planes.
#[derive(Clone, Debug)]
pub struct Picture {
    luma: Plane,
    chroma: Option<(Plane, Plane)>,
    frame_number: u64,
    aspect_ratio: AspectRatio,
    key_frame: bool,
    timestamp: Option<Duration>,
}

impl Picture {
    pub fn new(luma: Plane, frame_number: u64) -> Self {
        Self {
            luma,
            chroma: None,
            frame_number,
            aspect_ratio: AspectRatio::default(),
            key_frame: true,
            timestamp: None,
        }
    }

    pub fn with_chroma(mut self, u: Plane, v: Plane) -> FrameResult<Self> {
        let expected_w = self.luma.width.div_ceil(2);
        let expected_h = self.luma.height.div_ceil(2);
        for plane in [&u, &v] {
            if plane.width != expected_w || plane.height != expected_h {
                return Err(FrameError::invalid_frame(format!(
                    "chroma plane is {}x{}, expected {}x{}",
                    plane.width, plane.height, expected_w, expected_h
                )));
            }
        }
        self.chroma = Some((u, v));
        Ok(self)
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_key_frame(mut self, key_frame: bool) -> Self {
        self.key_frame = key_frame;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<Duration>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn luma(&self) -> &Plane {
        &self.luma
    }

    pub fn plane(&self, kind: PlaneKind) -> Option<&Plane> {
        match (kind, self.chroma.as_ref()) {
            (PlaneKind::Luma, _) => Some(&self.luma),
            (PlaneKind::ChromaU, Some((u, _))) => Some(u),
            (PlaneKind::ChromaV, Some((_, v))) => Some(v),
            _ => None,
        }
    }

    pub fn has_chroma(&self) -> bool {
        self.chroma.is_some()
    }

    pub fn plane_count(&self) -> usize {
        if self.chroma.is_some() { 3 } else { 1 }
    }

    pub fn width(&self) -> u32 {
        self.luma.width
    }

    pub fn height(&self) -> u32 {
        self.luma.height
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn is_key_frame(&self) -> bool {
        self.key_frame
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }
}
