use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use markcut_types::{AspectRatio, Corner, PlaneKind};
use tracing::{debug, info};

use crate::error::MaskIoError;
use crate::mask::LogoMask;
use crate::sobel::EdgePlane;

const CORNER_TAG: &str = "# markcut corner=";

/// Serializes one mask plane as a binary graymap.
pub fn encode_pgm(plane: &EdgePlane, corner: Corner) -> Vec<u8> {
    let header = format!(
        "P5\n{CORNER_TAG}{corner}\n{} {}\n255\n",
        plane.width(),
        plane.height()
    );
    let mut bytes = Vec::with_capacity(header.len() + plane.pixels().len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(plane.pixels());
    bytes
}

/// Parses a binary graymap written by [`encode_pgm`]. The corner comment is
/// required.
pub fn decode_pgm(bytes: &[u8], path: &Path) -> Result<(Corner, EdgePlane), MaskIoError> {
    let mut cursor = HeaderCursor { bytes, pos: 0 };
    let mut corner = None;
    let mut fields = Vec::with_capacity(4);
    while fields.len() < 4 {
        cursor.skip_whitespace();
        if cursor.peek() == Some(b'#') {
            let line = cursor.line();
            if let Some(name) = line.strip_prefix(CORNER_TAG) {
                corner = Some(
                    name.parse::<Corner>()
                        .map_err(|err| MaskIoError::malformed(path, err.to_string()))?,
                );
            }
            continue;
        }
        match cursor.token() {
            Some(token) => fields.push(token),
            None => return Err(MaskIoError::malformed(path, "truncated header")),
        }
    }
    if fields[0] != "P5" {
        return Err(MaskIoError::malformed(
            path,
            format!("unsupported magic '{}'", fields[0]),
        ));
    }
    let parse = |value: &str, what: &str| {
        value
            .parse::<u32>()
            .map_err(|_| MaskIoError::malformed(path, format!("invalid {what} '{value}'")))
    };
    let width = parse(&fields[1], "width")?;
    let height = parse(&fields[2], "height")?;
    if parse(&fields[3], "maxval")? != 255 {
        return Err(MaskIoError::malformed(path, "maxval must be 255"));
    }
    // Exactly one whitespace byte separates the header from the raster.
    let start = cursor.pos + 1;
    let expected = width as usize * height as usize;
    let raster = bytes
        .get(start..start + expected)
        .ok_or_else(|| MaskIoError::malformed(path, "raster is shorter than the header claims"))?;
    if bytes.len() != start + expected {
        return Err(MaskIoError::malformed(path, "trailing bytes after raster"));
    }
    let corner = corner.ok_or_else(|| MaskIoError::malformed(path, "missing corner comment"))?;
    let plane = EdgePlane::new(width, height, raster.to_vec())
        .map_err(|err| MaskIoError::malformed(path, err.to_string()))?;
    Ok((corner, plane))
}

struct HeaderCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl HeaderCursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn line(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn token(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(|b| !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        (self.pos > start).then(|| String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }
}

/// Directory of logo masks keyed by channel and aspect ratio.
#[derive(Debug, Clone)]
pub struct MaskRepository {
    dir: PathBuf,
}

impl MaskRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, channel: &str, aspect_ratio: AspectRatio, kind: PlaneKind) -> PathBuf {
        self.dir.join(format!(
            "{}-A{}-P{}.pgm",
            sanitize_channel(channel),
            aspect_ratio.key(),
            kind.index()
        ))
    }

    /// Loads the mask for (`channel`, `aspect_ratio`). A missing luma file
    /// means no mask has been learned yet.
    pub fn load(
        &self,
        channel: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<LogoMask>, MaskIoError> {
        let Some((corner, luma)) = self.read_plane(channel, aspect_ratio, PlaneKind::Luma)? else {
            return Ok(None);
        };
        let mut planes = vec![luma];
        let u = self.read_plane(channel, aspect_ratio, PlaneKind::ChromaU)?;
        let v = self.read_plane(channel, aspect_ratio, PlaneKind::ChromaV)?;
        match (u, v) {
            (Some((_, u)), Some((_, v))) => {
                planes.push(u);
                planes.push(v);
            }
            (None, None) => {}
            _ => {
                return Err(MaskIoError::malformed(
                    self.path_for(channel, aspect_ratio, PlaneKind::ChromaU),
                    "only one chroma plane is present",
                ));
            }
        }
        let path = self.path_for(channel, aspect_ratio, PlaneKind::Luma);
        let mask = LogoMask::new(corner, aspect_ratio, planes)
            .map_err(|err| MaskIoError::malformed(&path, err.to_string()))?;
        info!(
            channel,
            aspect = %aspect_ratio,
            corner = %mask.corner(),
            width = mask.width(),
            height = mask.height(),
            "loaded logo mask"
        );
        Ok(Some(mask))
    }

    /// Writes every populated plane. Each file is written under a temporary
    /// name and renamed into place.
    pub fn save(&self, channel: &str, mask: &LogoMask) -> Result<Vec<PathBuf>, MaskIoError> {
        fs::create_dir_all(&self.dir).map_err(|err| MaskIoError::io(&self.dir, err))?;
        let mut written = Vec::new();
        for kind in PlaneKind::ALL {
            let path = self.path_for(channel, mask.aspect_ratio(), kind);
            match mask.plane(kind) {
                Some(plane) => {
                    let tmp = path.with_extension("pgm.tmp");
                    fs::write(&tmp, encode_pgm(plane, mask.corner()))
                        .map_err(|err| MaskIoError::io(&tmp, err))?;
                    fs::rename(&tmp, &path).map_err(|err| MaskIoError::io(&path, err))?;
                    debug!(path = %path.display(), "wrote mask plane");
                    written.push(path);
                }
                None => match fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale mask plane"),
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(MaskIoError::io(&path, err)),
                },
            }
        }
        info!(channel, aspect = %mask.aspect_ratio(), corner = %mask.corner(), "saved logo mask");
        Ok(written)
    }

    fn read_plane(
        &self,
        channel: &str,
        aspect_ratio: AspectRatio,
        kind: PlaneKind,
    ) -> Result<Option<(Corner, EdgePlane)>, MaskIoError> {
        let path = self.path_for(channel, aspect_ratio, kind);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(MaskIoError::io(&path, err)),
        };
        decode_pgm(&bytes, &path).map(Some)
    }
}

fn sanitize_channel(channel: &str) -> String {
    let cleaned: String = channel
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sobel::EDGE;

    fn sample_mask(with_chroma: bool) -> LogoMask {
        let mut luma = EdgePlane::blank(12, 8);
        luma.set(5, 3, EDGE);
        luma.set(6, 3, EDGE);
        let mut planes = vec![luma];
        if with_chroma {
            let mut u = EdgePlane::blank(6, 4);
            u.set(2, 1, EDGE);
            planes.push(u);
            planes.push(EdgePlane::blank(6, 4));
        }
        LogoMask::new(Corner::BottomLeft, AspectRatio::FOUR_THREE, planes).unwrap()
    }

    #[test]
    fn pgm_load_then_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MaskRepository::new(dir.path());
        let mask = sample_mask(true);
        let written = repo.save("Das Erste HD", &mask).unwrap();
        assert_eq!(written.len(), 3);
        let originals: Vec<Vec<u8>> = written.iter().map(|p| fs::read(p).unwrap()).collect();

        let loaded = repo
            .load("Das Erste HD", AspectRatio::FOUR_THREE)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, mask);
        assert_eq!(loaded.edge_pixel_count(), 2);

        repo.save("Das Erste HD", &loaded).unwrap();
        let rewritten: Vec<Vec<u8>> = written.iter().map(|p| fs::read(p).unwrap()).collect();
        assert_eq!(originals, rewritten);
    }

    #[test]
    fn file_names_carry_channel_aspect_and_plane() {
        let repo = MaskRepository::new("/masks");
        let path = repo.path_for("Das Erste HD", AspectRatio::SIXTEEN_NINE, PlaneKind::ChromaV);
        assert_eq!(path, PathBuf::from("/masks/Das_Erste_HD-A16_9-P2.pgm"));
    }

    #[test]
    fn header_carries_corner_comment() {
        let mask = sample_mask(false);
        let bytes = encode_pgm(mask.plane(PlaneKind::Luma).unwrap(), mask.corner());
        assert!(bytes.starts_with(b"P5\n# markcut corner=bottom-left\n12 8\n255\n"));
        let (corner, plane) = decode_pgm(&bytes, Path::new("x.pgm")).unwrap();
        assert_eq!(corner, Corner::BottomLeft);
        assert_eq!(plane.edge_count(), 2);
    }

    #[test]
    fn missing_mask_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MaskRepository::new(dir.path());
        assert!(repo.load("ZDF", AspectRatio::default()).unwrap().is_none());
    }

    #[test]
    fn truncated_raster_is_malformed() {
        let mask = sample_mask(false);
        let mut bytes = encode_pgm(mask.plane(PlaneKind::Luma).unwrap(), mask.corner());
        bytes.truncate(bytes.len() - 3);
        let err = decode_pgm(&bytes, Path::new("x.pgm")).unwrap_err();
        assert!(matches!(err, MaskIoError::Malformed { .. }));
    }

    #[test]
    fn luma_only_save_removes_stale_chroma() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MaskRepository::new(dir.path());
        repo.save("arte", &sample_mask(true)).unwrap();
        repo.save("arte", &sample_mask(false)).unwrap();
        let loaded = repo.load("arte", AspectRatio::FOUR_THREE).unwrap().unwrap();
        assert!(!loaded.has_chroma());
    }
}
