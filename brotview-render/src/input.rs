/// A pointer or wheel event in canvas-local pixels.
///
/// Hosts report pointer-leave as [`InputEvent::PointerUp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp,
    /// Positive `delta_y` scrolls down (zoom out), negative zooms in.
    Wheel { delta_y: f64, x: f64, y: f64 },
}

/// Zoom step per wheel notch when zooming out.
pub const WHEEL_ZOOM_OUT: f64 = 0.9;
/// Zoom step per wheel notch when zooming in.
pub const WHEEL_ZOOM_IN: f64 = 1.1;

/// Zoom factor for a wheel delta. Anything but a positive delta zooms in,
/// including a zero delta; `None` for a NaN delta.
pub fn wheel_factor(delta_y: f64) -> Option<f64> {
    if delta_y.is_nan() {
        None
    } else if delta_y > 0.0 {
        Some(WHEEL_ZOOM_OUT)
    } else {
        Some(WHEEL_ZOOM_IN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_direction() {
        assert_eq!(wheel_factor(120.0), Some(0.9));
        assert_eq!(wheel_factor(-0.5), Some(1.1));
        assert_eq!(wheel_factor(0.0), Some(1.1));
        assert_eq!(wheel_factor(-0.0), Some(1.1));
        assert_eq!(wheel_factor(f64::NAN), None);
    }
}
