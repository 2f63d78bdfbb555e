/// A contiguous range of canvas rows, `row_start..row_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Band {
    pub row_start: u32,
    /// Exclusive.
    pub row_end: u32,
}

impl Band {
    pub fn new(row_start: u32, row_end: u32) -> Self {
        debug_assert!(row_start <= row_end);
        Self { row_start, row_end }
    }

    pub fn rows(&self) -> u32 {
        self.row_end - self.row_start
    }

    /// Size in bytes of this band's RGBA pixels for a canvas `width` wide.
    pub fn byte_len(&self, width: u32) -> usize {
        self.rows() as usize * width as usize * 4
    }
}

/// Split `height` rows into at most `workers` horizontal bands.
///
/// Bands are `ceil(height / workers)` rows tall, the last one truncated at
/// `height`. Together they cover `0..height` exactly once. When there are
/// fewer rows than workers the trailing bands would be empty and are left
/// out, so every returned band has at least one row.
pub fn partition_rows(height: u32, workers: usize) -> Vec<Band> {
    if height == 0 || workers == 0 {
        return Vec::new();
    }
    let workers = u32::try_from(workers).unwrap_or(u32::MAX);
    let rows_per_band = height.div_ceil(workers);
    (0..workers)
        .map(|i| i.saturating_mul(rows_per_band))
        .take_while(|&start| start < height)
        .map(|start| Band::new(start, start.saturating_add(rows_per_band).min(height)))
        .collect()
}

/// The finished pixels of one band, tagged with the request that made them.
///
/// Produced by exactly one worker and consumed once by frame assembly.
#[derive(Debug, Clone)]
pub struct Tile {
    pub generation: u64,
    pub band: Band,
    pub width: u32,
    /// RGBA bytes, `width × band.rows() × 4`.
    pub pixels: Vec<u8>,
}
