use markcut_types::{FrameError, FrameResult, Picture, PlaneKind, Region};
use serde::{Deserialize, Serialize};

/// Edge map value for "edge present".
pub const EDGE: u8 = 0;
/// Edge map value for "no edge".
pub const BLANK: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SobelConfig {
    /// Forced blank margin inside the region, halved for chroma.
    pub boundary: u32,
    /// Magnitude at or above which a luma pixel is an edge, halved for chroma.
    pub luma_cutoff: u32,
    /// Forced blank margin along the picture border.
    pub frame_guard: u32,
}

impl Default for SobelConfig {
    fn default() -> Self {
        Self {
            boundary: 4,
            luma_cutoff: 127,
            frame_guard: 2,
        }
    }
}

impl SobelConfig {
    pub fn boundary_for(&self, kind: PlaneKind) -> u32 {
        if kind.is_chroma() {
            self.boundary / 2
        } else {
            self.boundary
        }
    }

    pub fn cutoff_for(&self, kind: PlaneKind) -> u32 {
        if kind.is_chroma() {
            self.luma_cutoff / 2
        } else {
            self.luma_cutoff
        }
    }
}

/// One plane of binary edge classification, row-major without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct EdgePlane {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for EdgePlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgePlane")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("edges", &self.edge_count())
            .finish()
    }
}

impl EdgePlane {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> FrameResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(FrameError::invalid_frame(format!(
                "edge plane {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![BLANK; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.pixels[start..start + self.width as usize]
    }

    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.pixels[y as usize * self.width as usize + x as usize] == EDGE
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = y as usize * self.width as usize + x as usize;
        self.pixels[idx] = value;
    }

    pub fn edge_count(&self) -> u32 {
        self.pixels.iter().filter(|&&p| p == EDGE).count() as u32
    }

    pub fn row_edges(&self, y: u32) -> u32 {
        self.row(y).iter().filter(|&&p| p == EDGE).count() as u32
    }

    pub fn column_edges(&self, x: u32) -> u32 {
        (0..self.height).filter(|&y| self.is_edge(x, y)).count() as u32
    }

    /// Copies the `width`x`height` window starting at (`x`, `y`).
    pub fn window(&self, x: u32, y: u32, width: u32, height: u32) -> EdgePlane {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            let start = row as usize * self.width as usize + x as usize;
            pixels.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        EdgePlane {
            width,
            height,
            pixels,
        }
    }
}

/// Edge planes computed for one region of one picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap {
    region: Region,
    luma: EdgePlane,
    chroma: Option<(EdgePlane, EdgePlane)>,
}

impl EdgeMap {
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn luma(&self) -> &EdgePlane {
        &self.luma
    }

    pub fn plane(&self, kind: PlaneKind) -> Option<&EdgePlane> {
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

    /// Luma first, then both chroma planes when present.
    pub fn into_planes(self) -> Vec<EdgePlane> {
        let mut planes = vec![self.luma];
        if let Some((u, v)) = self.chroma {
            planes.push(u);
            planes.push(v);
        }
        planes
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SobelTransform {
    config: SobelConfig,
}

impl SobelTransform {
    pub fn new(config: SobelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SobelConfig {
        &self.config
    }

    /// Edge map of `region` for luma and, when `with_chroma` is set and the
    /// picture carries them, both chroma planes.
    pub fn transform(
        &self,
        picture: &Picture,
        region: Region,
        with_chroma: bool,
    ) -> FrameResult<EdgeMap> {
        let luma = self.transform_plane(picture, region, PlaneKind::Luma)?;
        let chroma = if with_chroma && picture.has_chroma() {
            Some((
                self.transform_plane(picture, region, PlaneKind::ChromaU)?,
                self.transform_plane(picture, region, PlaneKind::ChromaV)?,
            ))
        } else {
            None
        };
        Ok(EdgeMap {
            region,
            luma,
            chroma,
        })
    }

    pub fn transform_plane(
        &self,
        picture: &Picture,
        region: Region,
        kind: PlaneKind,
    ) -> FrameResult<EdgePlane> {
        let plane = picture
            .plane(kind)
            .ok_or(FrameError::MissingPlane { plane: kind })?;
        let rect = region.rect_in(kind, plane.width(), plane.height())?;
        let boundary = self.config.boundary_for(kind);
        let cutoff = self.config.cutoff_for(kind) as i32;
        // The 3x3 kernel needs one neighbour on every side.
        let guard = self.config.frame_guard.max(1);
        let (plane_w, plane_h) = (plane.width(), plane.height());

        let mut pixels = vec![BLANK; rect.width as usize * rect.height as usize];
        for y in 0..rect.height {
            if y < boundary || y + boundary >= rect.height {
                continue;
            }
            let ay = rect.y + y;
            if ay < guard || ay + guard >= plane_h {
                continue;
            }
            let above = plane.row(ay - 1);
            let here = plane.row(ay);
            let below = plane.row(ay + 1);
            for x in boundary..rect.width.saturating_sub(boundary) {
                let ax = rect.x + x;
                if ax < guard || ax + guard >= plane_w {
                    continue;
                }
                let (l, c, r) = ((ax - 1) as usize, ax as usize, (ax + 1) as usize);
                let p = |row: &[u8], i: usize| row[i] as i32;
                let gx = p(above, r) + 2 * p(here, r) + p(below, r)
                    - p(above, l)
                    - 2 * p(here, l)
                    - p(below, l);
                let gy = p(above, l) + 2 * p(above, c) + p(above, r)
                    - p(below, l)
                    - 2 * p(below, c)
                    - p(below, r);
                if gx.abs() + gy.abs() >= cutoff {
                    pixels[y as usize * rect.width as usize + x as usize] = EDGE;
                }
            }
        }
        EdgePlane::new(rect.width, rect.height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markcut_types::{Corner, Plane};

    fn square_picture(width: u32, height: u32) -> Picture {
        let mut luma = vec![16u8; (width * height) as usize];
        for y in 8..16 {
            for x in 8..16 {
                luma[(y * width + x) as usize] = 235;
            }
        }
        let luma = Plane::from_owned(width, height, width as usize, luma).unwrap();
        let (cw, ch) = (width / 2, height / 2);
        Picture::new(luma, 0)
            .with_chroma(Plane::filled(cw, ch, 128), Plane::filled(cw, ch, 128))
            .unwrap()
    }

    #[test]
    fn repeated_transforms_are_identical() {
        let picture = square_picture(64, 48);
        let region = Region::new(Corner::TopLeft, 32, 24).unwrap();
        let sobel = SobelTransform::default();
        let first = sobel.transform(&picture, region, true).unwrap();
        let second = sobel.transform(&picture, region, true).unwrap();
        assert_eq!(first, second);
        assert!(first.luma().edge_count() > 0);
        assert_eq!(first.plane(PlaneKind::ChromaU).unwrap().edge_count(), 0);
    }

    #[test]
    fn square_outline_is_detected_and_interior_is_blank() {
        let picture = square_picture(64, 48);
        let region = Region::new(Corner::TopLeft, 32, 24).unwrap();
        let map = SobelTransform::default()
            .transform(&picture, region, false)
            .unwrap();
        let luma = map.luma();
        assert!(luma.is_edge(8, 12));
        assert!(luma.is_edge(15, 12));
        assert!(!luma.is_edge(12, 12));
        assert!(!luma.is_edge(2, 2));
        assert!(map.plane(PlaneKind::ChromaU).is_none());
    }

    #[test]
    fn margins_are_forced_blank() {
        let width = 40;
        let height = 40;
        // Columns cycle through 0, 100, 200 so every interior pixel is an edge.
        let mut luma = vec![0u8; (width * height) as usize];
        for (idx, value) in luma.iter_mut().enumerate() {
            *value = ((idx % width as usize) % 3) as u8 * 100;
        }
        let luma = Plane::from_owned(width, height, width as usize, luma).unwrap();
        let picture = Picture::new(luma, 0);
        let region = Region::new(Corner::BottomRight, 20, 20).unwrap();
        let plane = SobelTransform::default()
            .transform_plane(&picture, region, PlaneKind::Luma)
            .unwrap();
        for y in 0..20 {
            for x in 0..20 {
                let inner = (4..16).contains(&x) && (4..16).contains(&y);
                // Picture border guard covers the last two rows and columns.
                let guarded = x >= 18 || y >= 18;
                assert_eq!(plane.is_edge(x, y), inner && !guarded, "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn missing_chroma_plane_is_an_error() {
        let picture = Picture::new(Plane::filled(32, 32, 0), 0);
        let region = Region::new(Corner::TopLeft, 16, 16).unwrap();
        let err = SobelTransform::default()
            .transform_plane(&picture, region, PlaneKind::ChromaV)
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::MissingPlane {
                plane: PlaneKind::ChromaV
            }
        ));
    }

    #[test]
    fn oversized_region_is_rejected() {
        let picture = Picture::new(Plane::filled(32, 32, 0), 0);
        let region = Region::new(Corner::TopLeft, 64, 16).unwrap();
        let err = SobelTransform::default()
            .transform(&picture, region, false)
            .unwrap_err();
        assert!(matches!(err, FrameError::RegionOutOfBounds { .. }));
    }
}
