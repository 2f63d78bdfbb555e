use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::error::CoreError;

/// Validate canvas dimensions before anything is rasterized.
pub fn validate_dimensions(width: u32, height: u32) -> crate::Result<()> {
    if width == 0 || height == 0 {
        return Err(CoreError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// The visible region of the complex plane.
///
/// `zoom` is relative: at `zoom = 1.0` the canvas spans two units of the
/// complex plane along each axis, whatever its pixel size. Each axis is
/// scaled by its own extent, so non-square canvases stretch the plane.
///
/// Pixel `y` grows with the imaginary part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center: Complex,
    /// Always positive and finite.
    pub zoom: f64,
}

impl ViewState {
    /// Centre of the initial (and reset) view.
    pub const DEFAULT_CENTER: Complex = Complex::new(-0.7, 0.0);
    pub const DEFAULT_ZOOM: f64 = 1.0;

    pub fn new(center: Complex, zoom: f64) -> crate::Result<Self> {
        if zoom <= 0.0 || !zoom.is_finite() {
            return Err(CoreError::InvalidZoom(zoom));
        }
        Ok(Self { center, zoom })
    }

    /// Check the zoom invariant on a value that may have been built by hand
    /// or deserialized.
    pub fn validate(&self) -> crate::Result<()> {
        if self.zoom <= 0.0 || !self.zoom.is_finite() {
            return Err(CoreError::InvalidZoom(self.zoom));
        }
        Ok(())
    }

    #[inline]
    fn scale(&self) -> f64 {
        0.5 * self.zoom
    }

    /// Map a (possibly fractional) pixel coordinate to the complex plane.
    #[inline]
    pub fn pixel_to_complex(&self, px: f64, py: f64, width: u32, height: u32) -> Complex {
        let w = width as f64;
        let h = height as f64;
        let scale = self.scale();
        Complex::new(
            self.center.re + (px - w / 2.0) / (scale * w),
            self.center.im + (py - h / 2.0) / (scale * h),
        )
    }

    /// Inverse of [`pixel_to_complex`](Self::pixel_to_complex).
    pub fn complex_to_pixel(&self, c: Complex, width: u32, height: u32) -> (f64, f64) {
        let w = width as f64;
        let h = height as f64;
        let scale = self.scale();
        (
            (c.re - self.center.re) * scale * w + w / 2.0,
            (c.im - self.center.im) * scale * h + h / 2.0,
        )
    }

    /// Move the view by a pointer delta so the content follows the pointer.
    pub fn panned(&self, dx: f64, dy: f64, width: u32, height: u32) -> Self {
        let scale = self.scale();
        Self {
            center: Complex::new(
                self.center.re - dx / (scale * width as f64),
                self.center.im - dy / (scale * height as f64),
            ),
            zoom: self.zoom,
        }
    }

    /// Multiply the zoom by `factor`, keeping the complex point under pixel
    /// `(px, py)` fixed.
    ///
    /// Fails when `factor` is not a positive finite number, or when the
    /// resulting zoom would leave the representable range.
    pub fn zoomed_at(
        &self,
        px: f64,
        py: f64,
        factor: f64,
        width: u32,
        height: u32,
    ) -> crate::Result<Self> {
        if factor <= 0.0 || !factor.is_finite() {
            return Err(CoreError::InvalidScaleFactor(factor));
        }
        let anchor = self.pixel_to_complex(px, py, width, height);
        let zoomed = Self::new(self.center, self.zoom * factor)?;
        let drifted = zoomed.pixel_to_complex(px, py, width, height);
        Ok(Self {
            center: zoomed.center + (anchor - drifted),
            zoom: zoomed.zoom,
        })
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            center: Self::DEFAULT_CENTER,
            zoom: Self::DEFAULT_ZOOM,
        }
    }
}
