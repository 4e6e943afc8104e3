use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::background::parse_hex_colour;
use crate::error_codes::CodedError;
use crate::romanization::RomanizationMode;

pub const LANDSCAPE_SIZE: (u32, u32) = (1920, 1080);
pub const PORTRAIT_SIZE: (u32, u32) = (1080, 1920);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    #[default]
    None,
    Colour,
    FullImage,
    DoubleImage,
}

impl BackgroundMode {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "colour" | "color" => Ok(Self::Colour),
            "full_image" => Ok(Self::FullImage),
            "double_image" => Ok(Self::DoubleImage),
            _ => Err(anyhow!(CodedError::usage(
                "INVALID_BACKGROUND_MODE",
                format!("invalid background mode '{value}'"),
            )
            .with_details(json!({
                "provided": value,
                "allowed": ["none", "colour", "full_image", "double_image"]
            })))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoPosition {
    Top,
    #[default]
    Center,
    Bottom,
}

impl VideoPosition {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "center" | "centre" => Ok(Self::Center),
            "bottom" => Ok(Self::Bottom),
            _ => Err(anyhow!(CodedError::usage(
                "INVALID_VIDEO_POSITION",
                format!("invalid video position '{value}'"),
            )
            .with_details(json!({
                "provided": value,
                "allowed": ["top", "center", "bottom"]
            })))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoubleBackgroundImages {
    #[serde(default)]
    pub image1: Option<PathBuf>,
    #[serde(default)]
    pub image2: Option<PathBuf>,
}

/// Live overlay settings read at the start of every draw. The owner mutates
/// it between draws; resetting a session is `OverlayConfig::default()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Top of the caption block, in output pixels.
    pub vertical_position: f32,
    pub size_multiplier: f32,
    /// Seconds added to playback time before segment lookup.
    pub lyric_offset: f64,
    pub landscape_mode: bool,
    pub background_mode: BackgroundMode,
    pub background_colour: String,
    pub background_image: Option<PathBuf>,
    pub double_background_images: DoubleBackgroundImages,
    pub video_position: VideoPosition,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    pub romanization: RomanizationMode,
    pub custom_transliterations: Option<PathBuf>,
    /// Extra jyutping table merged over the bundled one.
    pub jyutping_dictionary: Option<PathBuf>,
    pub use_tone_numbers: bool,
    pub font_path: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            vertical_position: 200.0,
            size_multiplier: 1.0,
            lyric_offset: 0.0,
            landscape_mode: false,
            background_mode: BackgroundMode::None,
            background_colour: "#000000".to_owned(),
            background_image: None,
            double_background_images: DoubleBackgroundImages::default(),
            video_position: VideoPosition::Center,
            trim_start: None,
            trim_end: None,
            romanization: RomanizationMode::Jyutping,
            custom_transliterations: None,
            jyutping_dictionary: None,
            use_tone_numbers: false,
            font_path: None,
        }
    }
}

impl OverlayConfig {
    /// Reads a YAML config. Relative paths inside it resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: OverlayConfig = serde_yaml::from_str(&contents).map_err(|error| {
            let location = error
                .location()
                .map(|location| format!("line {}, column {}", location.line(), location.column()))
                .unwrap_or_else(|| "unknown location".to_owned());
            anyhow!(
                "failed to parse yaml in {} at {}: {}",
                path.display(),
                location,
                error
            )
        })?;

        let config_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.resolve_paths(&config_dir);
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |slot: &mut Option<PathBuf>| {
            if let Some(path) = slot.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        };
        resolve(&mut self.background_image);
        resolve(&mut self.double_background_images.image1);
        resolve(&mut self.double_background_images.image2);
        resolve(&mut self.custom_transliterations);
        resolve(&mut self.jyutping_dictionary);
        resolve(&mut self.font_path);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.size_multiplier.is_finite() || self.size_multiplier <= 0.0 {
            bail!("size_multiplier must be > 0, got {}", self.size_multiplier);
        }
        if !self.vertical_position.is_finite() {
            bail!("vertical_position must be finite");
        }
        if !self.lyric_offset.is_finite() {
            bail!("lyric_offset must be finite");
        }
        if let Some(start) = self.trim_start {
            if !start.is_finite() || start < 0.0 {
                bail!("trim_start must be >= 0, got {start}");
            }
        }
        if let Some(end) = self.trim_end {
            if !end.is_finite() || end <= self.trim_start() {
                bail!("trim_end must be after trim_start, got {end}");
            }
        }
        parse_hex_colour(&self.background_colour)?;
        Ok(())
    }

    pub fn trim_start(&self) -> f64 {
        self.trim_start.unwrap_or(0.0)
    }

    /// Export surface size: 1920x1080 in landscape, 1080x1920 otherwise.
    pub fn output_dimensions(&self) -> (u32, u32) {
        if self.landscape_mode {
            LANDSCAPE_SIZE
        } else {
            PORTRAIT_SIZE
        }
    }

    /// Images the current background mode draws.
    pub fn background_image_paths(&self) -> Vec<&Path> {
        match self.background_mode {
            BackgroundMode::FullImage => self.background_image.as_deref().into_iter().collect(),
            BackgroundMode::DoubleImage => [
                self.double_background_images.image1.as_deref(),
                self.double_background_images.image2.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect(),
            BackgroundMode::None | BackgroundMode::Colour => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error_codes::find_coded_error;

    #[test]
    fn defaults_match_fresh_session() {
        let config = OverlayConfig::default();
        assert_eq!(config.vertical_position, 200.0);
        assert_eq!(config.size_multiplier, 1.0);
        assert_eq!(config.lyric_offset, 0.0);
        assert!(!config.landscape_mode);
        assert_eq!(config.video_position, VideoPosition::Center);
        assert_eq!(config.output_dimensions(), (1080, 1920));
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config: OverlayConfig =
            serde_yaml::from_str("size_multiplier: 2\nlandscape_mode: true\nbackground_mode: full_image\n")
                .unwrap();
        assert_eq!(config.size_multiplier, 2.0);
        assert_eq!(config.background_mode, BackgroundMode::FullImage);
        assert_eq!(config.vertical_position, 200.0);
        assert_eq!(config.output_dimensions(), (1920, 1080));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_yaml::from_str::<OverlayConfig>("vertical_pos: 10\n").is_err());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.yaml");
        fs::write(
            &path,
            "background_mode: double_image\ndouble_background_images:\n  image1: a.png\n  image2: /abs/b.png\njyutping_dictionary: dict/extra.tsv\n",
        )
        .unwrap();
        let config = OverlayConfig::load(&path).unwrap();
        assert_eq!(
            config.background_image_paths(),
            vec![dir.path().join("a.png").as_path(), Path::new("/abs/b.png")]
        );
        assert_eq!(
            config.jyutping_dictionary,
            Some(dir.path().join("dict/extra.tsv"))
        );
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = OverlayConfig::default();
        config.size_multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = OverlayConfig::default();
        config.trim_start = Some(5.0);
        config.trim_end = Some(4.0);
        assert!(config.validate().is_err());

        let mut config = OverlayConfig::default();
        config.background_colour = "red".to_owned();
        let error = config.validate().unwrap_err();
        assert_eq!(find_coded_error(&error).unwrap().code, "INVALID_COLOUR");
    }

    #[test]
    fn keywords_parse_with_aliases() {
        assert_eq!(BackgroundMode::from_keyword("full-image").unwrap(), BackgroundMode::FullImage);
        assert_eq!(BackgroundMode::from_keyword("color").unwrap(), BackgroundMode::Colour);
        assert!(BackgroundMode::from_keyword("gradient").is_err());
        assert_eq!(VideoPosition::from_keyword("TOP").unwrap(), VideoPosition::Top);
    }
}
