pub mod assembly;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod export;
pub mod input;
pub mod palette;
pub mod pool;
pub mod refine;
pub mod renderer;
pub mod request;
pub mod scheduler;
pub mod surface;
pub mod tile;

pub use assembly::{FrameAssembler, MAX_RETRIES};
pub use buffer::FrameBuffer;
pub use config::RenderConfig;
pub use controller::{InteractionState, IssuedRequest, RenderController, RenderStats};
pub use debounce::Debouncer;
pub use engine::{Engine, EngineStatus};
pub use error::RenderError;
pub use export::{export_frame, export_png, ExportMetadata};
pub use input::InputEvent;
pub use palette::PaletteId;
pub use pool::{OutcomeSink, TileOutcome, WorkerPool};
pub use refine::{RefinePolicy, RefineWhenIdle};
pub use renderer::{render_frame_into, BandKernel, EscapeTimeKernel};
pub use request::{RenderRequest, ResolutionTier};
pub use scheduler::{PassEvent, Scheduler};
pub use surface::{BufferSurface, RenderSurface};
pub use tile::{partition_rows, Band, Tile};

/// Convenience result type for the render crate.
pub type Result<T> = std::result::Result<T, RenderError>;
