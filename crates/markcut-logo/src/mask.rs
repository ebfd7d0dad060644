use markcut_types::{AspectRatio, Corner, PerPlane, PlaneKind, Region};

use crate::error::{LogoError, LogoResult};
use crate::sobel::{EDGE, EdgeMap, EdgePlane};

/// Per-plane agreement between a live edge map and a logo mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Pixels that are edges in both the map and the mask.
    pub matched: PerPlane<u32>,
    /// Luma matches relative to the mask's edge pixel count.
    pub ratio: f32,
}

/// Reference edge pattern of a station logo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoMask {
    region: Region,
    aspect_ratio: AspectRatio,
    luma: EdgePlane,
    chroma: Option<(EdgePlane, EdgePlane)>,
    edge_pixel_count: u32,
}

impl LogoMask {
    /// Builds a mask from the luma plane followed by optional chroma planes.
    pub fn new(
        corner: Corner,
        aspect_ratio: AspectRatio,
        planes: Vec<EdgePlane>,
    ) -> LogoResult<Self> {
        let mut planes = planes.into_iter();
        let luma = planes
            .next()
            .ok_or_else(|| LogoError::invalid_mask("mask has no luma plane"))?;
        let chroma = match (planes.next(), planes.next(), planes.next()) {
            (None, None, None) => None,
            (Some(u), Some(v), None) => Some((u, v)),
            _ => return Err(LogoError::invalid_mask("mask needs one or three planes")),
        };
        let region = Region::new(corner, luma.width(), luma.height())
            .map_err(|err| LogoError::invalid_mask(err.to_string()))?;
        if let Some((u, v)) = &chroma {
            let expected = (luma.width() / 2, luma.height() / 2);
            for plane in [u, v] {
                if (plane.width(), plane.height()) != expected {
                    return Err(LogoError::invalid_mask(format!(
                        "chroma plane is {}x{}, expected {}x{}",
                        plane.width(),
                        plane.height(),
                        expected.0,
                        expected.1
                    )));
                }
            }
        }
        let edge_pixel_count = luma.edge_count();
        Ok(Self {
            region,
            aspect_ratio,
            luma,
            chroma,
            edge_pixel_count,
        })
    }

    pub fn corner(&self) -> Corner {
        self.region.corner()
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn width(&self) -> u32 {
        self.luma.width()
    }

    pub fn height(&self) -> u32 {
        self.luma.height()
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn edge_pixel_count(&self) -> u32 {
        self.edge_pixel_count
    }

    pub fn has_chroma(&self) -> bool {
        self.chroma.is_some()
    }

    pub fn plane(&self, kind: PlaneKind) -> Option<&EdgePlane> {
        match (kind, self.chroma.as_ref()) {
            (PlaneKind::Luma, _) => Some(&self.luma),
            (PlaneKind::ChromaU, Some((u, _))) => Some(u),
            (PlaneKind::ChromaV, Some((_, v))) => Some(v),
            _ => None,
        }
    }

    pub fn planes(&self) -> impl Iterator<Item = (PlaneKind, &EdgePlane)> {
        PlaneKind::ALL
            .into_iter()
            .filter_map(|kind| self.plane(kind).map(|plane| (kind, plane)))
    }

    /// Counts pixels that are edges in both `map` and the mask. Planes missing
    /// from either side count zero.
    pub fn compare(&self, map: &EdgeMap) -> LogoResult<MatchResult> {
        let mut matched = [0u32; 3];
        for (kind, mask_plane) in self.planes() {
            let Some(live) = map.plane(kind) else {
                continue;
            };
            if (live.width(), live.height()) != (mask_plane.width(), mask_plane.height()) {
                return Err(LogoError::invalid_mask(format!(
                    "{kind} edge map is {}x{} but the mask is {}x{}",
                    live.width(),
                    live.height(),
                    mask_plane.width(),
                    mask_plane.height()
                )));
            }
            matched[kind.index()] = live
                .pixels()
                .iter()
                .zip(mask_plane.pixels())
                .filter(|&(&a, &b)| a == EDGE && b == EDGE)
                .count() as u32;
        }
        let ratio = if self.edge_pixel_count == 0 {
            0.0
        } else {
            matched[0] as f32 / self.edge_pixel_count as f32
        };
        Ok(MatchResult { matched, ratio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sobel::{BLANK, SobelTransform};
    use markcut_types::{Picture, Plane};

    fn plane_with_edges(width: u32, height: u32, edges: &[(u32, u32)]) -> EdgePlane {
        let mut plane = EdgePlane::blank(width, height);
        for &(x, y) in edges {
            plane.set(x, y, EDGE);
        }
        plane
    }

    #[test]
    fn edge_pixel_count_is_fixed_at_creation() {
        let luma = plane_with_edges(8, 4, &[(1, 1), (2, 1), (3, 2)]);
        let mask = LogoMask::new(Corner::TopLeft, AspectRatio::FOUR_THREE, vec![luma]).unwrap();
        assert_eq!(mask.edge_pixel_count(), 3);
        assert!(!mask.has_chroma());
        assert_eq!(mask.region().width(), 8);
    }

    #[test]
    fn rejects_odd_or_mismatched_planes() {
        let odd = EdgePlane::blank(7, 4);
        assert!(LogoMask::new(Corner::TopLeft, AspectRatio::default(), vec![odd]).is_err());

        let planes = vec![
            EdgePlane::blank(8, 4),
            EdgePlane::blank(4, 2),
            EdgePlane::blank(3, 2),
        ];
        assert!(LogoMask::new(Corner::TopLeft, AspectRatio::default(), planes).is_err());

        let two = vec![EdgePlane::blank(8, 4), EdgePlane::blank(4, 2)];
        assert!(LogoMask::new(Corner::TopLeft, AspectRatio::default(), two).is_err());
    }

    #[test]
    fn white_agreement_does_not_count_as_a_match() {
        let picture = Picture::new(Plane::filled(64, 48, 80), 0);
        let region = Region::new(Corner::TopLeft, 16, 16).unwrap();
        let map = SobelTransform::default()
            .transform(&picture, region, false)
            .unwrap();
        assert!(map.luma().pixels().iter().all(|&p| p == BLANK));

        let mask_plane = plane_with_edges(16, 16, &[(6, 6), (7, 6)]);
        let mask = LogoMask::new(Corner::TopLeft, AspectRatio::default(), vec![mask_plane]).unwrap();
        let result = mask.compare(&map).unwrap();
        assert_eq!(result.matched, [0, 0, 0]);
        assert_eq!(result.ratio, 0.0);
    }

    #[test]
    fn ratio_counts_shared_edges() {
        let mut luma = vec![16u8; 64 * 48];
        for y in 6..10 {
            for x in 6..10 {
                luma[y * 64 + x] = 235;
            }
        }
        let picture = Picture::new(Plane::from_owned(64, 48, 64, luma).unwrap(), 0);
        let region = Region::new(Corner::TopLeft, 16, 16).unwrap();
        let map = SobelTransform::default()
            .transform(&picture, region, false)
            .unwrap();
        let mask = LogoMask::new(
            Corner::TopLeft,
            AspectRatio::default(),
            vec![map.luma().clone()],
        )
        .unwrap();
        let result = mask.compare(&map).unwrap();
        assert_eq!(result.matched[0], mask.edge_pixel_count());
        assert_eq!(result.ratio, 1.0);
    }
}
