use std::fmt;

use brotview_core::{validate_dimensions, CoreError, ViewState};

use crate::config::RenderConfig;
use crate::palette::PaletteId;

/// Detail level of one rasterization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionTier {
    /// Block-sampled preview shown while the user interacts.
    Coarse,
    /// One sample per pixel, issued once interaction settles.
    Fine,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionTier::Coarse => f.write_str("coarse"),
            ResolutionTier::Fine => f.write_str("fine"),
        }
    }
}

/// Everything a worker needs to rasterize one pass.
///
/// Immutable once issued. `generation` is stamped by the scheduler when the
/// request is submitted; a higher generation supersedes every lower one.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub generation: u64,
    pub tier: ResolutionTier,
    pub view: ViewState,
    pub max_iterations: u32,
    pub palette: PaletteId,
    pub width: u32,
    pub height: u32,
    /// Edge of the square block sharing one sample. `1` for the fine tier.
    pub pixel_size: u32,
}

impl RenderRequest {
    /// Build an unstamped request from the current view and configuration.
    pub fn new(
        tier: ResolutionTier,
        view: ViewState,
        config: &RenderConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let pixel_size = match tier {
            ResolutionTier::Fine => 1,
            ResolutionTier::Coarse => config.coarse_pixel_size(view.zoom),
        };
        Self {
            generation: 0,
            tier,
            view,
            max_iterations: config.max_iterations,
            palette: config.palette,
            width,
            height,
            pixel_size,
        }
    }

    /// Reject requests that would render garbage.
    pub fn validate(&self) -> brotview_core::Result<()> {
        if self.max_iterations == 0 {
            return Err(CoreError::InvalidMaxIterations(0));
        }
        validate_dimensions(self.width, self.height)?;
        self.view.validate()
    }

    /// Bytes per RGBA row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }
}
