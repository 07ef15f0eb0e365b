//! Band-sequential pixel buffers.

use super::RasterError;

/// Sample type of a raster product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    /// Unsigned 8-bit samples (visual products).
    Byte,
    /// Signed 16-bit samples (reflectance products).
    Int16,
}

impl PixelType {
    /// Size of one sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            PixelType::Byte => 1,
            PixelType::Int16 => 2,
        }
    }

    /// Bits per sample, as written to the TIFF `BitsPerSample` tag.
    pub fn bits_per_sample(&self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    /// Clamps a sample into the representable range of this type.
    pub fn clamp(&self, value: i32) -> i32 {
        match self {
            PixelType::Byte => value.clamp(u8::MIN as i32, u8::MAX as i32),
            PixelType::Int16 => value.clamp(i16::MIN as i32, i16::MAX as i32),
        }
    }
}

/// Raw pixel samples of a rectangular raster, band-sequential.
///
/// Sample `(band, col, row)` lives at
/// `band * width * height + row * width + col`. Samples are held as `i32`
/// whatever the product's [`PixelType`]; conversion happens at the file
/// boundary.
///
/// The same type serves as a single tile and as the row buffer spanning a
/// whole row of tiles during assembly.
#[derive(Clone, PartialEq, Eq)]
pub struct TileBuffer {
    width: u32,
    height: u32,
    bands: u32,
    samples: Vec<i32>,
}

impl TileBuffer {
    /// Creates a zero-filled buffer.
    pub fn new(width: u32, height: u32, bands: u32) -> Self {
        let len = width as usize * height as usize * bands as usize;
        Self {
            width,
            height,
            bands,
            samples: vec![0; len],
        }
    }

    /// Wraps existing band-sequential samples.
    pub fn from_samples(
        width: u32,
        height: u32,
        bands: u32,
        samples: Vec<i32>,
    ) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize * bands as usize;
        if samples.len() != expected {
            return Err(RasterError::SampleCount {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bands,
            samples,
        })
    }

    /// Creates a buffer where every band holds `value` everywhere.
    pub fn filled(width: u32, height: u32, bands: u32, value: i32) -> Self {
        let mut buffer = Self::new(width, height, bands);
        buffer.samples.fill(value);
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> u32 {
        self.bands
    }

    /// Number of pixels in one band.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i32> {
        self.samples
    }

    /// Samples of one band in row-major order.
    pub fn band(&self, band: u32) -> &[i32] {
        let plane = self.pixel_count();
        let start = band as usize * plane;
        &self.samples[start..start + plane]
    }

    pub fn band_mut(&mut self, band: u32) -> &mut [i32] {
        let plane = self.pixel_count();
        let start = band as usize * plane;
        &mut self.samples[start..start + plane]
    }

    #[inline]
    fn index(&self, band: u32, col: u32, row: u32) -> usize {
        band as usize * self.pixel_count() + row as usize * self.width as usize + col as usize
    }

    #[inline]
    pub fn get(&self, band: u32, col: u32, row: u32) -> i32 {
        self.samples[self.index(band, col, row)]
    }

    #[inline]
    pub fn set(&mut self, band: u32, col: u32, row: u32, value: i32) {
        let idx = self.index(band, col, row);
        self.samples[idx] = value;
    }

    /// Copies every band of pixel `index` (row-major within a band) from
    /// `other`, which must have the same shape.
    #[inline]
    pub fn copy_pixel_from(&mut self, other: &TileBuffer, index: usize) {
        let plane = self.pixel_count();
        for band in 0..self.bands as usize {
            self.samples[band * plane + index] = other.samples[band * plane + index];
        }
    }

    /// True when the buffer holds no data at all.
    pub fn is_all_zero(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }

    /// Copies `src` into this buffer with its top-left corner at
    /// `(x_offset, y_offset)`.
    pub fn copy_from(
        &mut self,
        src: &TileBuffer,
        x_offset: u32,
        y_offset: u32,
    ) -> Result<(), RasterError> {
        if src.bands != self.bands {
            return Err(RasterError::BandMismatch {
                expected: self.bands,
                actual: src.bands,
            });
        }
        if x_offset + src.width > self.width || y_offset + src.height > self.height {
            return Err(RasterError::OutOfBounds {
                x: x_offset,
                y: y_offset,
                width: src.width,
                height: src.height,
            });
        }

        let src_w = src.width as usize;
        for band in 0..self.bands {
            for row in 0..src.height {
                let from = src.index(band, 0, row);
                let to = self.index(band, x_offset, y_offset + row);
                self.samples[to..to + src_w].copy_from_slice(&src.samples[from..from + src_w]);
            }
        }
        Ok(())
    }

    /// Extracts the `width × height` window whose top-left corner is at
    /// `(x_offset, y_offset)`.
    pub fn window(
        &self,
        x_offset: u32,
        y_offset: u32,
        width: u32,
        height: u32,
    ) -> Result<TileBuffer, RasterError> {
        if x_offset + width > self.width || y_offset + height > self.height {
            return Err(RasterError::OutOfBounds {
                x: x_offset,
                y: y_offset,
                width,
                height,
            });
        }

        let mut out = TileBuffer::new(width, height, self.bands);
        let w = width as usize;
        for band in 0..self.bands {
            for row in 0..height {
                let from = self.index(band, x_offset, y_offset + row);
                let to = out.index(band, 0, row);
                out.samples[to..to + w].copy_from_slice(&self.samples[from..from + w]);
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for TileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bands", &self.bands)
            .finish_non_exhaustive()
    }
}
