use thiserror::Error;

/// Errors originating from view math and request validation.
///
/// Every variant describes a configuration problem: the caller asked for
/// something that cannot be rendered, so nothing is changed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid max iterations: {0} (must be >= 1)")]
    InvalidMaxIterations(u32),

    #[error("invalid zoom: {0} (must be positive and finite)")]
    InvalidZoom(f64),

    #[error("invalid canvas dimensions: {width}×{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("invalid zoom scale factor: {0} (must be positive and finite)")]
    InvalidScaleFactor(f64),
}
