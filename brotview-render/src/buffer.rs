use crate::tile::{Band, Tile};

/// The canvas-sized RGBA pixel store.
///
/// Tiles write disjoint row ranges, so the buffer itself needs no locking:
/// either the coordinator copies finished tiles in one at a time, or
/// [`band_slices_mut`](Self::band_slices_mut) hands out exclusive
/// sub-slices for in-place parallel rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    /// RGBA pixel data, 4 bytes per pixel, row-major order.
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Create a new buffer filled with opaque black.
    pub fn new(width: u32, height: u32) -> Self {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        for chunk in pixels.chunks_exact_mut(4) {
            chunk[3] = 255;
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// RGBA bytes of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.stride() + x as usize * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// Reallocate for new dimensions. Returns `true` if the size changed, in
    /// which case the contents are reset to black.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == self.width && height == self.height {
            return false;
        }
        *self = Self::new(width, height);
        true
    }

    /// Copy a finished tile into its rows.
    ///
    /// Returns `false`, leaving the buffer untouched, if the tile was made
    /// for a different width or does not fit.
    pub fn write_tile(&mut self, tile: &Tile) -> bool {
        if tile.width != self.width
            || tile.band.row_end > self.height
            || tile.pixels.len() != tile.band.byte_len(self.width)
        {
            return false;
        }
        let start = tile.band.row_start as usize * self.stride();
        self.pixels[start..start + tile.pixels.len()].copy_from_slice(&tile.pixels);
        true
    }

    /// Split the buffer into one exclusive slice per band.
    ///
    /// `bands` must be sorted and non-overlapping (as produced by
    /// [`partition_rows`](crate::tile::partition_rows)); rows between bands
    /// are simply not handed out. Returns `None` if the bands violate that
    /// or run past the last row.
    pub fn band_slices_mut(&mut self, bands: &[Band]) -> Option<Vec<&mut [u8]>> {
        let stride = self.stride();
        let height = self.height;
        let mut rest: &mut [u8] = &mut self.pixels;
        let mut consumed_rows = 0u32;
        let mut slices = Vec::with_capacity(bands.len());
        for band in bands {
            if band.row_start < consumed_rows
                || band.row_start > band.row_end
                || band.row_end > height
            {
                return None;
            }
            let skip = (band.row_start - consumed_rows) as usize * stride;
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(skip);
            let (slice, tail) = tail.split_at_mut(band.rows() as usize * stride);
            slices.push(slice);
            rest = tail;
            consumed_rows = band.row_end;
        }
        Some(slices)
    }
}
