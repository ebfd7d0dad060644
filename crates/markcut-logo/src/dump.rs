use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use markcut_types::Corner;
use thiserror::Error;
use tracing::{debug, warn};

use crate::mask::LogoMask;
use crate::sobel::EdgePlane;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Writes edge planes as grayscale PNG files for inspection. Failures are
/// logged and never abort the caller.
#[derive(Debug, Clone)]
pub struct DebugDump {
    dir: PathBuf,
}

impl DebugDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn candidate(&self, corner: Corner, frame_number: u64, hits: u32, planes: &[EdgePlane]) {
        for (idx, plane) in planes.iter().enumerate() {
            let name = format!("candidate-{corner}-F{frame_number:06}-H{hits}-P{idx}.png");
            self.write_logged(&name, plane);
        }
    }

    pub fn mask(&self, mask: &LogoMask) {
        for (kind, plane) in mask.planes() {
            let name = format!("mask-{}-P{}.png", mask.corner(), kind.index());
            self.write_logged(&name, plane);
        }
    }

    fn write_logged(&self, name: &str, plane: &EdgePlane) {
        match self.write_plane(name, plane) {
            Ok(path) => debug!(path = %path.display(), "dumped edge plane"),
            Err(err) => warn!(name, error = %err, "failed to dump edge plane"),
        }
    }

    pub fn write_plane(&self, name: &str, plane: &EdgePlane) -> Result<PathBuf, DumpError> {
        fs::create_dir_all(&self.dir).map_err(|source| DumpError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut encoded = Vec::new();
        PngEncoder::new(&mut encoded).write_image(
            plane.pixels(),
            plane.width(),
            plane.height(),
            ColorType::L8,
        )?;
        let path = self.dir.join(name);
        fs::write(&path, encoded).map_err(|source| DumpError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
