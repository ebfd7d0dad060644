use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::{BaseDirs, ProjectDirs};
use markcut_decoder::{Backend, Configuration};
use markcut_logo::{DiscoveryConfig, MatcherConfig, SobelConfig};
use markcut_overlap::{OverlapConfig, SourceCodec};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const CONFIG_FILE: &str = "markcut.toml";
const DEFAULT_CHANNEL: &str = "default";
const DEFAULT_MASK_DIR: &str = "logos";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    logo: LogoFileConfig,
    discovery: DiscoveryConfig,
    matcher: MatcherConfig,
    overlap: OverlapConfig,
    decoder: DecoderFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogoFileConfig {
    channel: Option<String>,
    mask_dir: Option<String>,
    sobel: SobelConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DecoderFileConfig {
    backend: Option<String>,
    input: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    frame_rate: Option<f64>,
    frames: Option<u64>,
    gop: Option<u64>,
    codec: Option<String>,
}

/// Analysis settings after layering the config file over the defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Channel identity the logo mask is stored under.
    pub channel: String,
    pub mask_dir: PathBuf,
    pub sobel: SobelConfig,
    pub discovery: DiscoveryConfig,
    pub matcher: MatcherConfig,
    pub overlap: OverlapConfig,
    pub decoder: Configuration,
    pub codec: SourceCodec,
    /// File the settings were read from, if any.
    pub config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            mask_dir: default_mask_dir(),
            sobel: SobelConfig::default(),
            discovery: DiscoveryConfig::default(),
            matcher: MatcherConfig::default(),
            overlap: OverlapConfig::default(),
            decoder: Configuration::default(),
            codec: SourceCodec::default(),
            config_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for '{field}'{}", in_file(.path))]
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },

    #[error("config file {} does not exist", .path.display())]
    NotFound { path: PathBuf },
}

fn in_file(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" in {}", path.display()))
        .unwrap_or_default()
}

impl Settings {
    /// Reads the settings from `path_override`, else `./markcut.toml`, else
    /// the platform config directory. Without any file the defaults apply.
    pub fn load(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        let (file, path) = load_config(path_override)?;
        merge(file, path)
    }

    /// Parses `contents` as if read from `path`. Relative paths inside are
    /// resolved against the directory of `path`.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let file = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        merge(file, Some(path.to_path_buf()))
    }
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        return read_config(path);
    }

    if let Some(project_path) = project_config_path().filter(|path| path.exists()) {
        return read_config(project_path);
    }

    match default_config_path().filter(|path| path.exists()) {
        Some(default_path) => read_config(default_path),
        None => Ok((FileConfig::default(), None)),
    }
}

fn read_config(path: PathBuf) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "loaded settings");
    Ok((config, Some(path)))
}

fn merge(file: FileConfig, config_path: Option<PathBuf>) -> Result<Settings, ConfigError> {
    let paths = ConfigPaths {
        config_dir: config_path.as_deref().and_then(Path::parent),
    };
    let invalid = |field: &'static str, value: String| ConfigError::InvalidValue {
        path: config_path.clone(),
        field,
        value,
    };

    let FileConfig {
        logo,
        mut discovery,
        matcher,
        overlap,
        decoder: file_decoder,
    } = file;

    let channel = non_blank(logo.channel).unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    let mask_dir = logo
        .mask_dir
        .and_then(|dir| paths.resolve(&dir))
        .unwrap_or_else(default_mask_dir);
    discovery.dump_dir = discovery.dump_dir.take().and_then(|dir| paths.resolve_buf(dir));

    let mut decoder = Configuration::default();
    if let Some(value) = non_blank(file_decoder.backend) {
        decoder.backend = Backend::from_str(&value).map_err(|_| invalid("decoder.backend", value))?;
    }
    decoder.input = file_decoder.input.and_then(|input| paths.resolve(&input));
    if let Some(width) = file_decoder.width {
        decoder.width = width;
    }
    if let Some(height) = file_decoder.height {
        decoder.height = height;
    }
    if let Some(frame_rate) = file_decoder.frame_rate {
        decoder.frame_rate = frame_rate;
    }
    if let Some(frames) = file_decoder.frames {
        decoder.frames = frames;
    }
    if let Some(gop) = file_decoder.gop {
        decoder.gop = gop;
    }
    decoder
        .validate()
        .map_err(|err| invalid("decoder", err.to_string()))?;

    let codec = match non_blank(file_decoder.codec) {
        Some(value) => {
            SourceCodec::from_str(&value).map_err(|_| invalid("decoder.codec", value))?
        }
        None => SourceCodec::default(),
    };

    if matcher.imark > matcher.vmark {
        return Err(invalid("matcher.imark", matcher.imark.to_string()));
    }
    if discovery.max_samples == 0 {
        return Err(invalid("discovery.max_samples", "0".to_string()));
    }
    if !overlap.min_run.is_finite() || overlap.min_run <= 0.0 {
        return Err(invalid("overlap.min_run", overlap.min_run.to_string()));
    }

    Ok(Settings {
        channel,
        mask_dir,
        sobel: logo.sobel,
        discovery,
        matcher,
        overlap,
        decoder,
        codec,
        config_path,
    })
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("rs", "markcut", "markcut")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE))
}

fn default_mask_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join(DEFAULT_MASK_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MASK_DIR))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Resolves the paths a settings file names: `~` is the home directory and
/// relative paths are taken from the file's directory.
struct ConfigPaths<'a> {
    config_dir: Option<&'a Path>,
}

impl ConfigPaths<'_> {
    fn resolve(&self, value: &str) -> Option<PathBuf> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let path = home_relative(value).unwrap_or_else(|| PathBuf::from(value));
        Some(match self.config_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        })
    }

    fn resolve_buf(&self, path: PathBuf) -> Option<PathBuf> {
        match path.to_str() {
            Some(value) => self.resolve(value),
            None => Some(path),
        }
    }
}

fn home_relative(value: &str) -> Option<PathBuf> {
    let home = BaseDirs::new()?.home_dir().to_path_buf();
    match value.strip_prefix("~/") {
        Some(rest) => Some(home.join(rest)),
        None => (value == "~").then_some(home),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> Result<Settings, ConfigError> {
        Settings::parse(contents, Path::new("/etc/markcut/markcut.toml"))
    }

    #[test]
    fn sections_layer_over_defaults() {
        let settings = parse(
            r#"
            [logo]
            channel = "  Das Erste HD "
            mask_dir = "masks"

            [logo.sobel]
            luma_cutoff = 100

            [discovery]
            max_samples = 400
            storage = "packed"

            [matcher]
            vmark = 0.7

            [overlap]
            min_run = 5.5

            [decoder]
            backend = "synthetic"
            frame_rate = 50.0
            codec = "h264"
            "#,
        )
        .unwrap();

        assert_eq!(settings.channel, "Das Erste HD");
        assert_eq!(settings.mask_dir, PathBuf::from("/etc/markcut/masks"));
        assert_eq!(settings.sobel.luma_cutoff, 100);
        assert_eq!(settings.sobel.boundary, SobelConfig::default().boundary);
        assert_eq!(settings.discovery.max_samples, 400);
        assert_eq!(settings.discovery.storage, markcut_logo::StorageKind::Packed);
        assert_eq!(
            settings.discovery.luma_match_rate,
            DiscoveryConfig::default().luma_match_rate
        );
        assert_eq!(settings.matcher.vmark, 0.7);
        assert_eq!(settings.matcher.imark, MatcherConfig::default().imark);
        assert_eq!(settings.overlap.min_run, 5.5);
        assert_eq!(settings.decoder.backend, Backend::Synthetic);
        assert_eq!(settings.decoder.frame_rate, 50.0);
        assert_eq!(settings.decoder.width, Configuration::default().width);
        assert_eq!(settings.codec, SourceCodec::H264);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = parse("").unwrap();
        assert_eq!(settings.channel, DEFAULT_CHANNEL);
        assert_eq!(settings.mask_dir, default_mask_dir());
        assert_eq!(settings.codec, SourceCodec::Mpeg2);
        assert_eq!(settings.overlap, OverlapConfig::default());
        assert!(settings.discovery.dump_dir.is_none());
    }

    #[test]
    fn relative_dump_dir_resolves_against_config_file() {
        let settings = parse("[discovery]\ndump_dir = \"dump\"\n").unwrap();
        assert_eq!(
            settings.discovery.dump_dir,
            Some(PathBuf::from("/etc/markcut/dump"))
        );
    }

    #[test]
    fn invalid_values_name_the_field() {
        let err = parse("[decoder]\nbackend = \"ffmpeg\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "decoder.backend",
                ..
            }
        ));
        assert!(err.to_string().contains("/etc/markcut/markcut.toml"));

        let err = parse("[matcher]\nvmark = 0.1\nimark = 0.2\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "matcher.imark",
                ..
            }
        ));

        let err = parse("[decoder]\nframe_rate = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "decoder", .. }));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let err = parse("[overlap\nmin_run = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("failed to parse config file /etc/markcut"));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = Settings::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));

        let present = dir.path().join("markcut.toml");
        fs::write(&present, "[logo]\nchannel = \"arte\"\nmask_dir = \"logos\"\n").unwrap();
        let settings = Settings::load(Some(&present)).unwrap();
        assert_eq!(settings.channel, "arte");
        assert_eq!(settings.mask_dir, dir.path().join("logos"));
        assert_eq!(settings.config_path.as_deref(), Some(present.as_path()));
    }

    #[test]
    fn paths_expand_home_and_skip_blanks() {
        let paths = ConfigPaths {
            config_dir: Some(Path::new("/etc/markcut")),
        };
        assert_eq!(paths.resolve("   "), None);
        assert_eq!(paths.resolve("/srv/masks"), Some(PathBuf::from("/srv/masks")));
        assert_eq!(paths.resolve(" masks "), Some(PathBuf::from("/etc/markcut/masks")));
        if let Some(dirs) = BaseDirs::new() {
            assert_eq!(paths.resolve("~/masks"), Some(dirs.home_dir().join("masks")));
            assert_eq!(paths.resolve("~"), Some(dirs.home_dir().to_path_buf()));
        }
        assert_eq!(non_blank(Some("  ".to_string())), None);
    }
}
