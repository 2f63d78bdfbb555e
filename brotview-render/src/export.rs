//! PNG snapshots with the view recorded in tEXt chunks.

use std::io::BufWriter;
use std::path::Path;

use tracing::debug;

use brotview_core::ViewState;

use crate::buffer::FrameBuffer;
use crate::error::RenderError;
use crate::palette::PaletteId;
use crate::request::RenderRequest;

/// What an exported image shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportMetadata {
    pub view: ViewState,
    pub max_iterations: u32,
    pub palette: PaletteId,
}

impl ExportMetadata {
    pub fn from_request(request: &RenderRequest) -> Self {
        Self {
            view: request.view,
            max_iterations: request.max_iterations,
            palette: request.palette,
        }
    }

    fn description(&self) -> String {
        format!(
            "Mandelbrot set - Center: {} {}i, Zoom: {}, Iterations: {}, Palette: {}",
            self.view.center.re, self.view.center.im, self.view.zoom, self.max_iterations, self.palette,
        )
    }

    fn pairs(&self, width: u32, height: u32) -> [(&'static str, String); 6] {
        [
            ("Brotview.CenterRe", self.view.center.re.to_string()),
            ("Brotview.CenterIm", self.view.center.im.to_string()),
            ("Brotview.Zoom", self.view.zoom.to_string()),
            ("Brotview.MaxIterations", self.max_iterations.to_string()),
            ("Brotview.Palette", self.palette.name().to_string()),
            ("Brotview.Resolution", format!("{width}x{height}")),
        ]
    }
}

fn export_err(what: &str) -> impl FnOnce(png::EncodingError) -> RenderError + '_ {
    move |e| RenderError::Export(format!("{what}: {e}"))
}

/// Write tightly packed RGBA pixels to `path` as a PNG.
pub fn export_png(
    pixels: &[u8],
    width: u32,
    height: u32,
    path: &Path,
    metadata: &ExportMetadata,
) -> crate::Result<()> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(RenderError::Export(format!(
            "{} bytes do not make a {width}x{height} RGBA image",
            pixels.len()
        )));
    }

    let file = std::fs::File::create(path)
        .map_err(|e| RenderError::Export(format!("failed to create {}: {e}", path.display())))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Default);

    encoder
        .add_text_chunk("Software".to_string(), "brotview".to_string())
        .map_err(export_err("text chunk"))?;
    encoder
        .add_text_chunk("Description".to_string(), metadata.description())
        .map_err(export_err("text chunk"))?;
    for (key, value) in metadata.pairs(width, height) {
        encoder
            .add_text_chunk(key.to_string(), value)
            .map_err(export_err(key))?;
    }

    let mut writer = encoder.write_header().map_err(export_err("PNG header"))?;
    writer
        .write_image_data(pixels)
        .map_err(export_err("PNG image data"))?;
    writer.finish().map_err(export_err("PNG trailer"))?;

    debug!(width, height, path = %path.display(), "Exported PNG");
    Ok(())
}

/// Write a whole frame buffer as a PNG.
pub fn export_frame(frame: &FrameBuffer, path: &Path, metadata: &ExportMetadata) -> crate::Result<()> {
    export_png(frame.pixels(), frame.width(), frame.height(), path, metadata)
}
