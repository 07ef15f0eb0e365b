//! Per-pixel cloud class masks.

use super::SegmentationError;
use crate::raster::TileBuffer;

/// Class of a clear pixel.
pub const CLASS_CLEAR: u8 = 1;

/// Highest (most severe) cloud/shadow class.
pub const CLASS_MAX: u8 = 4;

/// True for the cloud/shadow classes 2, 3 and 4.
#[inline]
pub fn is_cloud(class: u8) -> bool {
    (2..=CLASS_MAX).contains(&class)
}

/// Square grid of per-pixel classes, row-major.
///
/// 1 is clear, 2–4 are increasing cloud/shadow severity. Masks built by
/// segmentation never contain 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMask {
    size: u32,
    classes: Vec<u8>,
}

impl ClassMask {
    /// A mask where every pixel is clear.
    pub fn clear(size: u32) -> Self {
        Self {
            size,
            classes: vec![CLASS_CLEAR; size as usize * size as usize],
        }
    }

    /// Wraps row-major classes of a `size × size` mask.
    pub fn from_classes(size: u32, classes: Vec<u8>) -> Result<Self, SegmentationError> {
        let expected = size as usize * size as usize;
        if classes.len() != expected {
            return Err(SegmentationError::InvalidInput(format!(
                "mask has {} classes, expected {}",
                classes.len(),
                expected
            )));
        }
        Ok(Self { size, classes })
    }

    /// Mask of the same size holding `classes`.
    pub(crate) fn with_classes(&self, classes: Vec<u8>) -> Self {
        debug_assert_eq!(classes.len(), self.classes.len());
        Self {
            size: self.size,
            classes,
        }
    }

    /// Side length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[inline]
    pub fn get(&self, col: u32, row: u32) -> u8 {
        self.classes[row as usize * self.size as usize + col as usize]
    }

    #[inline]
    pub fn set(&mut self, col: u32, row: u32, class: u8) {
        let idx = row as usize * self.size as usize + col as usize;
        self.classes[idx] = class;
    }

    /// Class at row-major index `index`.
    #[inline]
    pub fn at(&self, index: usize) -> u8 {
        self.classes[index]
    }

    #[inline]
    pub fn set_at(&mut self, index: usize, class: u8) {
        self.classes[index] = class;
    }

    /// Number of pixels in classes 2–4.
    pub fn cloud_count(&self) -> usize {
        self.classes.iter().filter(|&&c| is_cloud(c)).count()
    }

    /// `cloud_count / size²`, in `[0, 1]`.
    pub fn cloud_fraction(&self) -> f64 {
        if self.classes.is_empty() {
            return 0.0;
        }
        self.cloud_count() as f64 / self.classes.len() as f64
    }

    /// Single-band buffer of the classes, for mask rasters.
    pub fn to_tile_buffer(&self) -> TileBuffer {
        let mut buffer = TileBuffer::new(self.size, self.size, 1);
        for (dst, &class) in buffer.band_mut(0).iter_mut().zip(&self.classes) {
            *dst = class as i32;
        }
        buffer
    }
}
