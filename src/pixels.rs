/// Bytes per BGRA pixel. Every buffer in the pipeline uses this layout.
pub const BYTES_PER_PIXEL: usize = 4;

/// Packed BGRA pixel buffer with an explicit row stride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        Self::with_stride(width, height, stride)
    }

    /// Stride is clamped up to the packed row width.
    pub fn with_stride(width: u32, height: u32, stride: usize) -> Self {
        let stride = stride.max(width as usize * BYTES_PER_PIXEL);
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }

    /// `len` pixels of row `y` starting at column `x`, or `None` when out of bounds.
    pub fn span(&self, x: u32, y: u32, len: u32) -> Option<&[u8]> {
        let (start, end) = self.span_range(x, y, len)?;
        self.data.get(start..end)
    }

    pub fn span_mut(&mut self, x: u32, y: u32, len: u32) -> Option<&mut [u8]> {
        let (start, end) = self.span_range(x, y, len)?;
        self.data.get_mut(start..end)
    }

    fn span_range(&self, x: u32, y: u32, len: u32) -> Option<(usize, usize)> {
        if y >= self.height || x.checked_add(len)? > self.width {
            return None;
        }
        let start = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        Some((start, start + len as usize * BYTES_PER_PIXEL))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.span(x, y, 1).map(|p| [p[0], p[1], p[2], p[3]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        if let Some(p) = self.span_mut(x, y, 1) {
            p.copy_from_slice(&bgra);
        }
    }

    pub fn fill(&mut self, bgra: [u8; 4]) {
        for y in 0..self.height {
            for px in self.row_mut(y).chunks_exact_mut(BYTES_PER_PIXEL) {
                px.copy_from_slice(&bgra);
            }
        }
    }
}
