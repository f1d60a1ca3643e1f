use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::{DEFAULT_SURFACE_SIZE, StrokeStyle, Surface};
use crate::compositor::{BOTTOM_OFFSET, Compositor, SIGNATURE_SCALE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub port: u16,
    /// Largest accepted upload, in bytes.
    pub body_limit: usize,
    pub surface_width: u32,
    pub surface_height: u32,
    pub stroke: StrokeStyle,
    pub signature_scale: f32,
    pub bottom_offset: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            body_limit: 50 * 1024 * 1024,
            surface_width: DEFAULT_SURFACE_SIZE.0,
            surface_height: DEFAULT_SURFACE_SIZE.1,
            stroke: StrokeStyle::default(),
            signature_scale: SIGNATURE_SCALE,
            bottom_offset: BOTTOM_OFFSET,
        }
    }
}

impl Config {
    /// `config.json` in the platform configuration directory, if there is one.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pdf-esign").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file at the default location means default settings; an
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Config::default_path() {
                Some(p) => (p, false),
                None => return Ok(Config::default()),
            },
        };
        if !explicit && !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.surface_width == 0 || self.surface_height == 0 {
            bail!("surface size must be non-zero, got {}x{}", self.surface_width, self.surface_height);
        }
        if !(self.stroke.width.is_finite() && self.stroke.width > 0.0) {
            bail!("stroke width must be positive, got {}", self.stroke.width);
        }
        if !(self.signature_scale.is_finite() && self.signature_scale > 0.0) {
            bail!("signature scale must be positive, got {}", self.signature_scale);
        }
        if !self.bottom_offset.is_finite() {
            bail!("bottom offset must be finite");
        }
        Ok(())
    }

    pub fn new_surface(&self) -> Result<Surface> {
        Surface::new(self.surface_width, self.surface_height, self.stroke)
            .with_context(|| format!("cannot create a {}x{} surface", self.surface_width, self.surface_height))
    }

    pub fn compositor(&self) -> Compositor {
        Compositor {
            scale: self.signature_scale,
            bottom_offset: self.bottom_offset,
        }
    }
}
