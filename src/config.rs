use anyhow::{anyhow, Result};
use image::Rgba;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CameraConfig, FacingMode};
use crate::detect::{InferenceSettings, DEFAULT_ENDPOINT};
use crate::overlay::{
    parse_hex_color, OverlayStyle, DEFAULT_COLOR, DEFAULT_FONT_PX, DEFAULT_LINE_WIDTH,
};

const DEFAULT_OUTPUT_DIR: &str = "bioscan_out";

#[derive(Debug, Deserialize, Default)]
struct BioscanConfigFile {
    output_dir: Option<PathBuf>,
    inference: Option<InferenceConfigFile>,
    camera: Option<CameraConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    front_device: Option<String>,
    back_device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    jpeg_quality: Option<u8>,
    default_facing: Option<FacingMode>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    color: Option<String>,
    line_width: Option<u32>,
    font_path: Option<PathBuf>,
    font_px: Option<f32>,
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BioscanConfig {
    pub output_dir: PathBuf,
    pub inference: InferenceSettings,
    pub camera: CameraConfig,
    pub default_facing: FacingMode,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    /// `#RRGGBB`
    pub color: String,
    pub line_width: u32,
    pub font_path: Option<PathBuf>,
    pub font_px: f32,
}

impl OverlaySettings {
    pub fn style(&self) -> Result<OverlayStyle> {
        let color: Rgba<u8> = parse_hex_color(&self.color)?;
        Ok(OverlayStyle {
            color,
            line_width: self.line_width,
            font_px: self.font_px,
        })
    }
}

impl BioscanConfig {
    /// Load from `BIOSCAN_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BIOSCAN_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit config file (if any), apply env overrides, validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, &ConfigOverrides::default())
    }

    /// Like `load_from`, with command-line overrides applied last.
    pub fn load_with(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BioscanConfigFile) -> Self {
        let defaults = CameraConfig::default();
        let inference = file.inference.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        Self {
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            inference: InferenceSettings {
                endpoint: inference
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                api_key: inference.api_key.unwrap_or_default(),
                timeout: inference.timeout_secs.map(Duration::from_secs),
            },
            camera: CameraConfig {
                front_device: camera.front_device.unwrap_or(defaults.front_device),
                back_device: camera.back_device.unwrap_or(defaults.back_device),
                width: camera.width.unwrap_or(defaults.width),
                height: camera.height.unwrap_or(defaults.height),
                jpeg_quality: camera.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            },
            default_facing: camera.default_facing.unwrap_or_default(),
            overlay: OverlaySettings {
                color: overlay.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
                line_width: overlay.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
                font_path: overlay.font_path,
                font_px: overlay.font_px.unwrap_or(DEFAULT_FONT_PX),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(endpoint) = std::env::var("BIOSCAN_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.inference.endpoint = endpoint;
            }
        }
        if let Ok(api_key) = std::env::var("BIOSCAN_API_KEY") {
            if !api_key.trim().is_empty() {
                self.inference.api_key = api_key;
            }
        }
        if let Ok(timeout) = std::env::var("BIOSCAN_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("BIOSCAN_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.inference.timeout = Some(Duration::from_secs(seconds));
        }
        if let Ok(device) = std::env::var("BIOSCAN_FRONT_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.front_device = device;
            }
        }
        if let Ok(device) = std::env::var("BIOSCAN_BACK_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.back_device = device;
            }
        }
        if let Ok(dir) = std::env::var("BIOSCAN_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("BIOSCAN_FONT_PATH") {
            if !path.trim().is_empty() {
                self.overlay.font_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(endpoint) = &overrides.endpoint {
            self.inference.endpoint = endpoint.clone();
        }
        if let Some(api_key) = &overrides.api_key {
            self.inference.api_key = api_key.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.inference.endpoint).map_err(|e| {
            anyhow!(
                "invalid inference endpoint {}: {}",
                self.inference.endpoint,
                e
            )
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "inference endpoint must be http(s), got {}",
                endpoint.scheme()
            ));
        }
        if self.inference.api_key.trim().is_empty() {
            return Err(anyhow!(
                "inference api key must be set (BIOSCAN_API_KEY or inference.api_key)"
            ));
        }
        if self.inference.timeout == Some(Duration::ZERO) {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(anyhow!("camera jpeg_quality must be between 1 and 100"));
        }
        if self.overlay.line_width == 0 {
            return Err(anyhow!("overlay line_width must be at least 1"));
        }
        if !(self.overlay.font_px.is_finite() && self.overlay.font_px > 0.0) {
            return Err(anyhow!("overlay font_px must be a positive number"));
        }
        parse_hex_color(&self.overlay.color)?;
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<BioscanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
