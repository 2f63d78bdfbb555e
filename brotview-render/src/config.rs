use std::time::Duration;

use serde::{Deserialize, Serialize};

use brotview_core::CoreError;

use crate::error::RenderError;
use crate::palette::PaletteId;

// ---------------------------------------------------------------------------
// Render configuration
// ---------------------------------------------------------------------------

/// Settings owned by the host and read by the engine.
///
/// Every field has a serde default so a partial JSON document (or `{}`)
/// yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Iteration budget per point. Useful range is roughly 50–2000.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub palette: PaletteId,
    /// Number of render workers. `None` means one per logical CPU.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Quiet period after the last interaction before the fine pass.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Coarse block edge at `zoom = 1`; shrinks as the view zooms in.
    #[serde(default = "default_coarse_block_size")]
    pub coarse_block_size: u32,
    #[serde(default = "default_coarse_block_floor")]
    pub coarse_block_floor: u32,
    #[serde(default = "default_coarse_block_ceiling")]
    pub coarse_block_ceiling: u32,
}

fn default_max_iterations() -> u32 {
    100
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_coarse_block_size() -> u32 {
    4
}

fn default_coarse_block_floor() -> u32 {
    2
}

fn default_coarse_block_ceiling() -> u32 {
    16
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            palette: PaletteId::default(),
            worker_count: None,
            debounce_ms: default_debounce_ms(),
            coarse_block_size: default_coarse_block_size(),
            coarse_block_floor: default_coarse_block_floor(),
            coarse_block_ceiling: default_coarse_block_ceiling(),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_iterations == 0 {
            return Err(CoreError::InvalidMaxIterations(0).into());
        }
        if self.worker_count == Some(0) {
            return Err(RenderError::InvalidWorkerCount(0));
        }
        if self.coarse_block_size == 0
            || self.coarse_block_floor == 0
            || self.coarse_block_floor > self.coarse_block_ceiling
        {
            return Err(RenderError::InvalidBlockSize {
                size: self.coarse_block_size,
                floor: self.coarse_block_floor,
                ceiling: self.coarse_block_ceiling,
            });
        }
        Ok(())
    }

    /// Resolved worker count: the configured value, or the number of
    /// logical CPUs, never less than one.
    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Block edge used by the coarse tier at the given zoom.
    ///
    /// Inversely proportional to zoom, clamped to the configured floor and
    /// ceiling.
    pub fn coarse_pixel_size(&self, zoom: f64) -> u32 {
        let floor = self.coarse_block_floor.max(1);
        let ceiling = self.coarse_block_ceiling.max(floor);
        let raw = (self.coarse_block_size as f64 / zoom).round();
        if raw.is_nan() {
            return floor;
        }
        raw.clamp(floor as f64, ceiling as f64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg: RenderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RenderConfig::default());
        assert_eq!(cfg.max_iterations, 100);
        assert_eq!(cfg.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn partial_json_overrides() {
        let cfg: RenderConfig = serde_json::from_str(
            r#"{"max_iterations": 500, "palette": "fire", "worker_count": 3}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_iterations, 500);
        assert_eq!(cfg.palette, PaletteId::Fire);
        assert_eq!(cfg.workers(), 3);
        assert_eq!(cfg.coarse_block_size, 4);
    }

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(RenderConfig::default().workers() >= 1);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let zero_iter = RenderConfig {
            max_iterations: 0,
            ..RenderConfig::default()
        };
        assert!(matches!(
            zero_iter.validate(),
            Err(RenderError::Config(CoreError::InvalidMaxIterations(0)))
        ));

        let zero_workers = RenderConfig {
            worker_count: Some(0),
            ..RenderConfig::default()
        };
        assert!(matches!(
            zero_workers.validate(),
            Err(RenderError::InvalidWorkerCount(0))
        ));

        let inverted = RenderConfig {
            coarse_block_floor: 8,
            coarse_block_ceiling: 4,
            ..RenderConfig::default()
        };
        assert!(inverted.validate().is_err());
        assert!(RenderConfig::default().validate().is_ok());
    }

    #[test]
    fn coarse_block_shrinks_with_zoom() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.coarse_pixel_size(1.0), 4);
        assert_eq!(cfg.coarse_pixel_size(0.5), 8);
        assert_eq!(cfg.coarse_pixel_size(0.01), 16);
        assert_eq!(cfg.coarse_pixel_size(2.0), 2);
        assert_eq!(cfg.coarse_pixel_size(1.0e6), 2);
    }
}
