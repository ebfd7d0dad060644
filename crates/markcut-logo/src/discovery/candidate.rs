use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sobel::{BLANK, EDGE, EdgeMap, EdgePlane};

/// How retained candidates keep their edge planes in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// One byte per pixel.
    #[default]
    Unpacked,
    /// One bit per pixel in `u64` words.
    Packed,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Unpacked => "unpacked",
            StorageKind::Packed => "packed",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct StorageKindParseError(pub String);

impl fmt::Display for StorageKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown candidate storage '{}'", self.0)
    }
}

impl std::error::Error for StorageKindParseError {}

impl FromStr for StorageKind {
    type Err = StorageKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "unpacked" => Ok(StorageKind::Unpacked),
            "packed" => Ok(StorageKind::Packed),
            _ => Err(StorageKindParseError(lower)),
        }
    }
}

/// Edge plane packed one bit per pixel, set bits are edges. Pixels are packed
/// in row-major order without per-row padding; bits past the last pixel stay
/// zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPlane {
    width: u32,
    height: u32,
    words: Vec<u64>,
}

impl PackedPlane {
    pub fn pack(plane: &EdgePlane) -> Self {
        let pixels = plane.pixels();
        let mut words = vec![0u64; pixels.len().div_ceil(64)];
        for (idx, &value) in pixels.iter().enumerate() {
            if value == EDGE {
                words[idx / 64] |= 1u64 << (idx % 64);
            }
        }
        Self {
            width: plane.width(),
            height: plane.height(),
            words,
        }
    }

    pub fn unpack(&self) -> EdgePlane {
        let len = self.pixel_count();
        let mut pixels = vec![BLANK; len];
        for (idx, pixel) in pixels.iter_mut().enumerate() {
            if self.words[idx / 64] & (1u64 << (idx % 64)) != 0 {
                *pixel = EDGE;
            }
        }
        EdgePlane::new(self.width, self.height, pixels)
            .unwrap_or_else(|_| EdgePlane::blank(self.width, self.height))
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn edge_count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Pixel agreement between two candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Agreement {
    /// Luma pixels that are edges in both.
    pub luma_both: u32,
    /// Luma pixels that are edges in at least one.
    pub luma_either: u32,
    /// Chroma pixels with the same classification, summed over both planes.
    pub chroma_agree: u32,
    /// Chroma pixels compared, summed over both planes.
    pub chroma_pixels: u32,
}

impl Agreement {
    /// `None` when neither candidate has a single luma edge.
    pub fn luma_rate(&self) -> Option<f32> {
        (self.luma_either > 0).then(|| self.luma_both as f32 / self.luma_either as f32)
    }

    /// `None` when chroma was not compared.
    pub fn chroma_rate(&self) -> Option<f32> {
        (self.chroma_pixels > 0).then(|| self.chroma_agree as f32 / self.chroma_pixels as f32)
    }
}

/// Edge planes of one candidate: luma first, then both chroma planes when
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateStorage {
    Unpacked(Vec<EdgePlane>),
    Packed(Vec<PackedPlane>),
}

impl CandidateStorage {
    pub fn from_planes(planes: Vec<EdgePlane>, kind: StorageKind) -> Self {
        match kind {
            StorageKind::Unpacked => CandidateStorage::Unpacked(planes),
            StorageKind::Packed => {
                CandidateStorage::Packed(planes.iter().map(PackedPlane::pack).collect())
            }
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            CandidateStorage::Unpacked(_) => StorageKind::Unpacked,
            CandidateStorage::Packed(_) => StorageKind::Packed,
        }
    }

    pub fn plane_count(&self) -> usize {
        match self {
            CandidateStorage::Unpacked(planes) => planes.len(),
            CandidateStorage::Packed(planes) => planes.len(),
        }
    }

    pub fn luma_edges(&self) -> u32 {
        match self {
            CandidateStorage::Unpacked(planes) => planes.first().map_or(0, EdgePlane::edge_count),
            CandidateStorage::Packed(planes) => planes.first().map_or(0, PackedPlane::edge_count),
        }
    }

    /// Byte-per-pixel copy of the planes.
    pub fn to_planes(&self) -> Vec<EdgePlane> {
        match self {
            CandidateStorage::Unpacked(planes) => planes.clone(),
            CandidateStorage::Packed(planes) => planes.iter().map(PackedPlane::unpack).collect(),
        }
    }

    /// Compares two candidates of the same shape and storage kind. Chroma is
    /// compared only when both carry it.
    pub fn agreement(&self, other: &Self) -> Option<Agreement> {
        match (self, other) {
            (CandidateStorage::Unpacked(a), CandidateStorage::Unpacked(b)) => {
                agreement_with(a, b, unpacked_luma, unpacked_chroma, |x, y| {
                    x.width() == y.width() && x.height() == y.height()
                })
            }
            (CandidateStorage::Packed(a), CandidateStorage::Packed(b)) => {
                agreement_with(a, b, packed_luma, packed_chroma, PackedPlane::same_shape)
            }
            _ => None,
        }
    }
}

fn agreement_with<P>(
    a: &[P],
    b: &[P],
    luma: impl Fn(&P, &P) -> (u32, u32),
    chroma: impl Fn(&P, &P) -> (u32, u32),
    same_shape: impl Fn(&P, &P) -> bool,
) -> Option<Agreement> {
    let (la, lb) = (a.first()?, b.first()?);
    if !same_shape(la, lb) {
        return None;
    }
    let (luma_both, luma_either) = luma(la, lb);
    let mut agreement = Agreement {
        luma_both,
        luma_either,
        ..Agreement::default()
    };
    if a.len() == 3 && b.len() == 3 {
        for (pa, pb) in a[1..].iter().zip(&b[1..]) {
            if !same_shape(pa, pb) {
                return None;
            }
            let (agree, pixels) = chroma(pa, pb);
            agreement.chroma_agree += agree;
            agreement.chroma_pixels += pixels;
        }
    }
    Some(agreement)
}

fn unpacked_luma(a: &EdgePlane, b: &EdgePlane) -> (u32, u32) {
    let mut both = 0;
    let mut either = 0;
    for (&x, &y) in a.pixels().iter().zip(b.pixels()) {
        let (ex, ey) = (x == EDGE, y == EDGE);
        both += (ex && ey) as u32;
        either += (ex || ey) as u32;
    }
    (both, either)
}

fn unpacked_chroma(a: &EdgePlane, b: &EdgePlane) -> (u32, u32) {
    let agree = a
        .pixels()
        .iter()
        .zip(b.pixels())
        .filter(|(x, y)| x == y)
        .count() as u32;
    (agree, a.pixels().len() as u32)
}

fn packed_luma(a: &PackedPlane, b: &PackedPlane) -> (u32, u32) {
    a.words
        .iter()
        .zip(&b.words)
        .fold((0, 0), |(both, either), (x, y)| {
            (both + (x & y).count_ones(), either + (x | y).count_ones())
        })
}

fn packed_chroma(a: &PackedPlane, b: &PackedPlane) -> (u32, u32) {
    let differ: u32 = a
        .words
        .iter()
        .zip(&b.words)
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    let pixels = a.pixel_count() as u32;
    (pixels - differ, pixels)
}

/// One corner's edge map of one sampled key frame.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub frame_number: u64,
    pub storage: CandidateStorage,
    pub hits: u32,
}

impl Candidate {
    pub fn new(frame_number: u64, map: EdgeMap, kind: StorageKind) -> Self {
        Self {
            frame_number,
            storage: CandidateStorage::from_planes(map.into_planes(), kind),
            hits: 0,
        }
    }

    pub fn agreement(&self, other: &Candidate) -> Option<Agreement> {
        self.storage.agreement(&other.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_plane(rng: &mut StdRng, width: u32, height: u32, density: f64) -> EdgePlane {
        let pixels = (0..width * height)
            .map(|_| if rng.gen_bool(density) { EDGE } else { BLANK })
            .collect();
        EdgePlane::new(width, height, pixels).unwrap()
    }

    fn random_planes(rng: &mut StdRng) -> Vec<EdgePlane> {
        vec![
            random_plane(rng, 70, 30, 0.2),
            random_plane(rng, 35, 15, 0.05),
            random_plane(rng, 35, 15, 0.05),
        ]
    }

    #[test]
    fn packed_and_unpacked_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let a = random_planes(&mut rng);
            let b = random_planes(&mut rng);
            let unpacked = CandidateStorage::from_planes(a.clone(), StorageKind::Unpacked)
                .agreement(&CandidateStorage::from_planes(b.clone(), StorageKind::Unpacked))
                .unwrap();
            let packed = CandidateStorage::from_planes(a, StorageKind::Packed)
                .agreement(&CandidateStorage::from_planes(b, StorageKind::Packed))
                .unwrap();
            assert_eq!(unpacked, packed);
            assert_eq!(unpacked.chroma_pixels, 2 * 35 * 15);
        }
    }

    #[test]
    fn pack_round_trips() {
        let mut rng = StdRng::seed_from_u64(11);
        let plane = random_plane(&mut rng, 33, 9, 0.3);
        let packed = PackedPlane::pack(&plane);
        assert_eq!(packed.unpack(), plane);
        assert_eq!(packed.edge_count(), plane.edge_count());
    }

    #[test]
    fn empty_luma_has_no_rate() {
        let blank = vec![EdgePlane::blank(8, 8)];
        let storage = CandidateStorage::from_planes(blank, StorageKind::Packed);
        let agreement = storage.agreement(&storage.clone()).unwrap();
        assert_eq!(agreement.luma_rate(), None);
        assert_eq!(agreement.chroma_rate(), None);
    }

    #[test]
    fn mismatched_shapes_are_not_comparable() {
        let a = CandidateStorage::from_planes(vec![EdgePlane::blank(8, 8)], StorageKind::Unpacked);
        let b = CandidateStorage::from_planes(vec![EdgePlane::blank(8, 6)], StorageKind::Unpacked);
        assert!(a.agreement(&b).is_none());
        let packed = CandidateStorage::from_planes(vec![EdgePlane::blank(8, 8)], StorageKind::Packed);
        assert!(a.agreement(&packed).is_none());
    }

    #[test]
    fn storage_kind_parses() {
        assert_eq!("Packed".parse::<StorageKind>().unwrap(), StorageKind::Packed);
        assert!("sparse".parse::<StorageKind>().is_err());
    }
}
