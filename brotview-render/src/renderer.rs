use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use brotview_core::escape_iterations;

use crate::buffer::FrameBuffer;
use crate::error::RenderError;
use crate::request::RenderRequest;
use crate::tile::{partition_rows, Band, Tile};

// ---------------------------------------------------------------------------
// Band kernel
// ---------------------------------------------------------------------------

/// Computes the pixels of one band for a request.
///
/// The pool is written against this trait so hosts and tests can swap the
/// computation; [`EscapeTimeKernel`] is the real one.
pub trait BandKernel: Send + Sync + 'static {
    /// Fill `out` (exactly `band.byte_len(request.width)` bytes) with RGBA.
    fn render(&self, request: &RenderRequest, band: Band, out: &mut [u8]) -> crate::Result<()>;
}

/// Escape-time evaluation followed by palette lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeTimeKernel;

impl BandKernel for EscapeTimeKernel {
    fn render(&self, request: &RenderRequest, band: Band, out: &mut [u8]) -> crate::Result<()> {
        if out.len() != band.byte_len(request.width) || band.row_end > request.height {
            return Err(RenderError::Kernel(format!(
                "band {}..{} does not fit a {}×{} canvas",
                band.row_start, band.row_end, request.width, request.height
            )));
        }
        render_band(request, band, out);
        Ok(())
    }
}

/// Rasterize `band` of `request` into `out`.
///
/// Sampling happens on a grid of `pixel_size` blocks anchored at pixel
/// `(0, 0)`. Each block is evaluated once at its centre (clipped to the
/// canvas) and the color fills the whole block, so a block straddling two
/// bands gets the same color in both.
pub fn render_band(request: &RenderRequest, band: Band, out: &mut [u8]) {
    let ps = request.pixel_size.max(1);
    let (width, height) = (request.width, request.height);
    let stride = request.stride();
    debug_assert_eq!(out.len(), band.byte_len(width));

    let mut by = band.row_start - band.row_start % ps;
    while by < band.row_end {
        let block_bottom = (by + ps).min(height);
        let sample_y = (by + block_bottom - 1) as f64 / 2.0;

        // First row of the block that lies inside this band.
        let y0 = by.max(band.row_start);
        let y1 = block_bottom.min(band.row_end);
        let first = (y0 - band.row_start) as usize * stride;
        let row = &mut out[first..first + stride];

        let mut bx = 0;
        while bx < width {
            let block_right = (bx + ps).min(width);
            let sample_x = (bx + block_right - 1) as f64 / 2.0;
            let c = request.view.pixel_to_complex(sample_x, sample_y, width, height);
            let n = escape_iterations(c, request.max_iterations);
            let [r, g, b] = request.palette.color_for(n, request.max_iterations);
            for px in row[bx as usize * 4..block_right as usize * 4].chunks_exact_mut(4) {
                px.copy_from_slice(&[r, g, b, 255]);
            }
            bx = block_right;
        }

        // Replicate onto the remaining rows of the block.
        for y in y0 + 1..y1 {
            let dst = (y - band.row_start) as usize * stride;
            out.copy_within(first..first + stride, dst);
        }
        by += ps;
    }
}

/// Allocate a tile and fill it with `kernel`.
pub fn render_tile(kernel: &dyn BandKernel, request: &RenderRequest, band: Band) -> crate::Result<Tile> {
    let mut pixels = vec![0u8; band.byte_len(request.width)];
    kernel.render(request, band, &mut pixels)?;
    Ok(Tile {
        generation: request.generation,
        band,
        width: request.width,
        pixels,
    })
}

// ---------------------------------------------------------------------------
// Direct full-frame render
// ---------------------------------------------------------------------------

/// Render a whole request synchronously into `frame`.
///
/// The frame is split into `workers` bands and each band's slice of the
/// buffer is filled in place on the Rayon pool. No tile buffers are
/// allocated. Used for one-shot snapshots; interactive rendering goes
/// through the [`Scheduler`](crate::scheduler::Scheduler).
pub fn render_frame_into(
    request: &RenderRequest,
    frame: &mut FrameBuffer,
    workers: usize,
) -> crate::Result<Duration> {
    request.validate()?;
    let start = Instant::now();
    frame.resize(request.width, request.height);

    let bands = partition_rows(request.height, workers.max(1));
    debug!(
        bands = bands.len(),
        width = request.width,
        height = request.height,
        tier = %request.tier,
        "Starting direct render"
    );
    let slices = frame
        .band_slices_mut(&bands)
        .ok_or_else(|| RenderError::Kernel("band partition does not fit frame".into()))?;

    slices
        .into_par_iter()
        .zip(bands.par_iter())
        .for_each(|(out, &band)| render_band(request, band, out));

    let elapsed = start.elapsed();
    info!(elapsed_ms = elapsed.as_millis(), "Direct render complete");
    Ok(elapsed)
}
