use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use brotview_render::RenderConfig;

/// Host settings: canvas size and snapshot path on top of the render
/// configuration, which is read from the same top-level object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(flatten)]
    pub render: RenderConfig,
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_output() -> PathBuf {
    PathBuf::from("brotview.png")
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            output: default_output(),
            render: RenderConfig::default(),
        }
    }
}

impl HostSettings {
    /// Read settings from `path`. A missing, unreadable or invalid file
    /// falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No settings file given; using defaults");
            return Self::default();
        };
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to read settings file {}: {e}", path.display());
                return Self::default();
            }
        };
        match Self::parse(&json) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Parse and validate a settings document.
    pub fn parse(json: &str) -> Result<Self, String> {
        let settings: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        settings.render.validate().map_err(|e| e.to_string())?;
        brotview_core::validate_dimensions(settings.width, settings.height)
            .map_err(|e| e.to_string())?;
        Ok(settings)
    }
}
