/// Where finished frames are presented.
///
/// The host owns the drawable; the controller only pushes pixels into it.
pub trait RenderSurface {
    /// Copy a tightly packed RGBA region of `width`×`height` pixels to
    /// `(x, y)`.
    fn put(&mut self, pixels: &[u8], x: u32, y: u32, width: u32, height: u32);

    fn size(&self) -> (u32, u32);

    /// Called when the controller is told the canvas changed size. Hosts
    /// whose drawable follows the window on its own can ignore it.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// An in-memory RGBA surface.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    presents: u64,
}

impl BufferSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            presents: 0,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels.get(i..i + 4)?.try_into().ok()
    }

    /// How many regions have been put so far.
    pub fn presents(&self) -> u64 {
        self.presents
    }
}

impl RenderSurface for BufferSurface {
    fn put(&mut self, pixels: &[u8], x: u32, y: u32, width: u32, height: u32) {
        let src_stride = width as usize * 4;
        if pixels.len() < src_stride * height as usize {
            return;
        }
        let dst_stride = self.width as usize * 4;
        let cols = width.min(self.width.saturating_sub(x)) as usize;
        let rows = height.min(self.height.saturating_sub(y));
        if cols == 0 || rows == 0 {
            return;
        }
        for row in 0..rows {
            let src = row as usize * src_stride;
            let dst = (y + row) as usize * dst_stride + x as usize * 4;
            self.pixels[dst..dst + cols * 4].copy_from_slice(&pixels[src..src + cols * 4]);
        }
        self.presents += 1;
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            *self = Self {
                presents: self.presents,
                ..Self::new(width, height)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_put() {
        let mut s = BufferSurface::new(2, 2);
        s.put(&[7; 16], 0, 0, 2, 2);
        assert_eq!(s.pixels(), &[7; 16]);
        assert_eq!(s.presents(), 1);
    }

    #[test]
    fn region_put_is_clipped() {
        let mut s = BufferSurface::new(3, 3);
        s.put(&[9; 16], 2, 2, 2, 2);
        assert_eq!(s.pixel(2, 2), Some([9; 4]));
        assert_eq!(s.pixel(1, 2), Some([0; 4]));
        assert_eq!(s.pixel(3, 3), None);
    }

    #[test]
    fn short_buffer_is_ignored() {
        let mut s = BufferSurface::new(2, 2);
        s.put(&[1; 4], 0, 0, 2, 2);
        assert_eq!(s.presents(), 0);
    }

    #[test]
    fn resize_reallocates() {
        let mut s = BufferSurface::new(2, 2);
        s.put(&[1; 16], 0, 0, 2, 2);
        s.resize(4, 1);
        assert_eq!(s.size(), (4, 1));
        assert_eq!(s.pixels().len(), 16);
        assert_eq!(s.presents(), 1);
    }
}
