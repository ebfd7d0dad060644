use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::{FrameError, FrameResult, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Synthetic,
    RawYuv,
}

impl FromStr for Backend {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" | "mock" => Ok(Backend::Synthetic),
            "raw-yuv" | "rawyuv" | "yuv" => Ok(Backend::RawYuv),
            other => Err(FrameError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Synthetic => "synthetic",
            Backend::RawYuv => "raw-yuv",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Length of the synthetic recording.
    pub frames: u64,
    /// Key frame interval of the synthetic recording.
    pub gop: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backend: Backend::RawYuv,
            input: None,
            width: 720,
            height: 576,
            frame_rate: 25.0,
            frames: 250,
            gop: 12,
        }
    }
}

impl Configuration {
    /// Reads `MARKCUT_BACKEND`, `MARKCUT_INPUT`, `MARKCUT_WIDTH`,
    /// `MARKCUT_HEIGHT`, `MARKCUT_FPS`, `MARKCUT_FRAMES` and `MARKCUT_GOP` over
    /// the defaults.
    pub fn from_env() -> FrameResult<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Some(backend) = var("MARKCUT_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Some(path) = var("MARKCUT_INPUT") {
            config.input = Some(PathBuf::from(path));
        }
        if let Some(width) = parse_var::<u32>(&var, "MARKCUT_WIDTH")? {
            config.width = width;
        }
        if let Some(height) = parse_var::<u32>(&var, "MARKCUT_HEIGHT")? {
            config.height = height;
        }
        if let Some(fps) = parse_var::<f64>(&var, "MARKCUT_FPS")? {
            config.frame_rate = fps;
        }
        if let Some(frames) = parse_var::<u64>(&var, "MARKCUT_FRAMES")? {
            config.frames = frames;
        }
        if let Some(gop) = parse_var::<u64>(&var, "MARKCUT_GOP")? {
            config.gop = gop;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FrameResult<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(FrameError::configuration(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::configuration(format!(
                "picture size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.gop == 0 {
            return Err(FrameError::configuration("key frame interval must be at least 1"));
        }
        Ok(())
    }

    pub fn create_provider(&self) -> FrameResult<Source> {
        self.validate()?;
        match self.backend {
            Backend::Synthetic => crate::backends::synthetic::open_synthetic(self),
            Backend::RawYuv => crate::backends::raw_yuv::open_raw_yuv(self),
        }
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> FrameResult<Option<T>> {
    let Some(raw) = var(name) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        FrameError::configuration(format!("failed to parse {name}='{raw}'"))
    })
}
