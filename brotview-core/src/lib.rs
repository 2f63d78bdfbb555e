pub mod complex;
pub mod error;
pub mod escape;
pub mod view;

// Re-export primary types for convenience.
pub use complex::Complex;
pub use error::CoreError;
pub use escape::{escape_iterations, ESCAPE_RADIUS_SQ};
pub use view::{validate_dimensions, ViewState};

/// Convenience result type for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
