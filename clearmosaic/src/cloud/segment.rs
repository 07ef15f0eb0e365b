//! Cloud segmentation adapter.
//!
//! Turns a reflectance tile into a per-pixel class mask:
//!
//! ```text
//! TileBuffer (≥3 bands, S×S)
//!   │  normalize: |(sample − 1175) / 0.25| for bands 0..3
//!   ▼
//! ClassifierInput  [1, 3, S, S] f32
//!   │  CloudClassifier::classify
//!   ▼
//! ClassScores      [1, 5, S, S] f32
//!   │  per-pixel argmax, 0 → 1
//!   ▼
//! ClassMask + cloud fraction
//! ```

use std::sync::Arc;

use super::{dilate, is_cloud, ClassMask, DilationKernel, SegmentationError, CLASS_CLEAR};
use crate::raster::TileBuffer;

/// Number of input channels the classifier expects.
pub const INPUT_CHANNELS: usize = 3;

/// Number of classes the classifier scores.
pub const CLASS_COUNT: usize = 5;

/// Reflectance offset subtracted before scaling.
pub const NORMALIZE_OFFSET: f32 = 1175.0;

/// Divisor applied after the offset.
pub const NORMALIZE_SCALE: f32 = 0.25;

/// Classifier input tensor, shape `[1, 3, size, size]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInput {
    pub size: u32,
    pub data: Vec<f32>,
}

impl ClassifierInput {
    pub fn shape(&self) -> [usize; 4] {
        [1, INPUT_CHANNELS, self.size as usize, self.size as usize]
    }
}

/// Classifier output tensor, shape `[1, 5, size, size]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
    pub size: u32,
    pub data: Vec<f32>,
}

/// A trained per-pixel cloud classifier.
///
/// Implementations are shared across worker threads.
pub trait CloudClassifier: Send + Sync {
    fn classify(&self, input: &ClassifierInput) -> Result<ClassScores, SegmentationError>;
}

/// Class mask of a tile and its cloud fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub mask: ClassMask,
    /// Share of pixels in classes 2–4, in `[0, 1]`.
    pub cloud_fraction: f64,
}

impl Segmentation {
    fn from_mask(mask: ClassMask) -> Self {
        let cloud_fraction = mask.cloud_fraction();
        Self {
            mask,
            cloud_fraction,
        }
    }
}

/// Builds the classifier input from the first three bands of `tile`.
pub fn normalize(tile: &TileBuffer, size: u32) -> Result<ClassifierInput, SegmentationError> {
    if tile.width() != size || tile.height() != size {
        return Err(SegmentationError::InvalidInput(format!(
            "tile is {}x{}, expected {}x{}",
            tile.width(),
            tile.height(),
            size,
            size
        )));
    }
    if (tile.bands() as usize) < INPUT_CHANNELS {
        return Err(SegmentationError::InvalidInput(format!(
            "tile has {} bands, expected at least {}",
            tile.bands(),
            INPUT_CHANNELS
        )));
    }

    let mut data = Vec::with_capacity(INPUT_CHANNELS * tile.pixel_count());
    for band in 0..INPUT_CHANNELS as u32 {
        data.extend(
            tile.band(band)
                .iter()
                .map(|&s| ((s as f32 - NORMALIZE_OFFSET) / NORMALIZE_SCALE).abs()),
        );
    }

    Ok(ClassifierInput { size, data })
}

/// Reduces class scores to a mask.
///
/// Each pixel takes the highest-scoring class, the lowest index winning
/// ties. Class 0 is reported as clear.
pub fn reduce_scores(scores: &ClassScores) -> Result<ClassMask, SegmentationError> {
    let plane = scores.size as usize * scores.size as usize;
    if scores.data.len() != CLASS_COUNT * plane {
        return Err(SegmentationError::Classifier(format!(
            "expected {} scores, got {}",
            CLASS_COUNT * plane,
            scores.data.len()
        )));
    }

    let classes = (0..plane)
        .map(|p| {
            let mut best = 0usize;
            let mut best_score = scores.data[p];
            for class in 1..CLASS_COUNT {
                let score = scores.data[class * plane + p];
                if score > best_score {
                    best = class;
                    best_score = score;
                }
            }
            if is_cloud(best as u8) {
                best as u8
            } else {
                CLASS_CLEAR
            }
        })
        .collect();

    ClassMask::from_classes(scores.size, classes)
}

/// Classifies tiles with a shared classifier.
#[derive(Clone)]
pub struct CloudSegmenter {
    classifier: Arc<dyn CloudClassifier>,
    size: u32,
}

impl CloudSegmenter {
    /// Creates a segmenter for `size × size` tiles.
    pub fn new(classifier: Arc<dyn CloudClassifier>, size: u32) -> Self {
        Self { classifier, size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Classifies `tile` and returns its mask and cloud fraction.
    pub fn classify(&self, tile: &TileBuffer) -> Result<Segmentation, SegmentationError> {
        let input = normalize(tile, self.size)?;
        let scores = self.classifier.classify(&input)?;
        if scores.size != self.size {
            return Err(SegmentationError::Classifier(format!(
                "classifier returned {}x{} scores for a {}x{} tile",
                scores.size, scores.size, self.size, self.size
            )));
        }
        Ok(Segmentation::from_mask(reduce_scores(&scores)?))
    }

    /// Classifies `tile`, dilates the mask and recomputes the cloud fraction
    /// from the dilated mask.
    pub fn classify_dilated(
        &self,
        tile: &TileBuffer,
        aperture: u32,
        kernel: DilationKernel,
    ) -> Result<Segmentation, SegmentationError> {
        let segmentation = self.classify(tile)?;
        Ok(Segmentation::from_mask(dilate(
            &segmentation.mask,
            aperture,
            kernel,
        )))
    }
}
