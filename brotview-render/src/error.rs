use thiserror::Error;

use crate::tile::Band;

/// Errors originating from the rendering pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] brotview_core::CoreError),

    #[error("invalid worker count: {0} (must be >= 1)")]
    InvalidWorkerCount(usize),

    #[error("no render worker with index {0}")]
    NoSuchWorker(usize),

    #[error("invalid coarse block sizes: size {size}, floor {floor}, ceiling {ceiling}")]
    InvalidBlockSize { size: u32, floor: u32, ceiling: u32 },

    #[error("failed to spawn render worker {worker}: {source}")]
    WorkerSpawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker failed on rows {}..{} after {attempts} attempts: {reason}", .band.row_start, .band.row_end)]
    WorkerFailed {
        band: Band,
        attempts: u32,
        reason: String,
    },

    #[error("failed to spawn render coordinator: {0}")]
    CoordinatorSpawn(#[source] std::io::Error),

    #[error("band render failed: {0}")]
    Kernel(String),

    #[error("render engine has shut down")]
    Shutdown,

    #[error("export failed: {0}")]
    Export(String),
}
