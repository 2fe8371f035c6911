use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::gfx::{TextureLimits, DEFAULT_MIN_TEXTURE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Path of the font image retrieved persistently on every reload.
    #[serde(default)]
    pub default_font: Option<String>,
    #[serde(default = "ImagesConfig::default_min_texture_size")]
    pub min_texture_size: u32,
    /// Caps the tiling size below what the device reports; useful for
    /// exercising the composite path on large-texture hardware.
    #[serde(default)]
    pub max_texture_size: Option<u32>,
    /// Hard cap on simultaneously live textures.
    #[serde(default)]
    pub texture_budget: Option<usize>,
}

impl ImagesConfig {
    const fn default_min_texture_size() -> u32 {
        DEFAULT_MIN_TEXTURE_SIZE
    }

    /// Effective limits given the dimension the device reports.
    pub fn limits(&self, device_max: u32) -> TextureLimits {
        let max = self.max_texture_size.map_or(device_max, |cap| cap.min(device_max));
        TextureLimits::new(self.min_texture_size, max)
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            default_font: None,
            min_texture_size: Self::default_min_texture_size(),
            max_texture_size: None,
            texture_budget: None,
        }
    }
}

pub fn load_images_config(path: impl AsRef<Path>) -> Result<ImagesConfig> {
    let path = path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("Reading image config {}", path.display()))?;
    let config = serde_json::from_slice(&bytes)
        .with_context(|| format!("Parsing image config {}", path.display()))?;
    Ok(config)
}
