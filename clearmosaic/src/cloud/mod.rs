//! Cloud classification and mask processing.
//!
//! - [`CloudSegmenter`]: normalize a reflectance tile, run the
//!   [`CloudClassifier`], reduce scores to a [`ClassMask`]
//! - [`dilate`]: grow cloud regions with a max filter
//! - `OnnxClassifier` (feature `onnx`): ONNX Runtime model

mod dilate;
mod mask;
#[cfg(feature = "onnx")]
mod onnx;
mod segment;

pub use dilate::{dilate, DilationKernel};
pub use mask::{is_cloud, ClassMask, CLASS_CLEAR, CLASS_MAX};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, DEFAULT_INPUT_NAME};
pub use segment::{
    normalize, reduce_scores, ClassScores, ClassifierInput, CloudClassifier, CloudSegmenter,
    Segmentation, CLASS_COUNT, INPUT_CHANNELS, NORMALIZE_OFFSET, NORMALIZE_SCALE,
};

#[cfg(test)]
pub use segment::tests::{BrokenClassifier, ThresholdClassifier};

use thiserror::Error;

/// Errors from tile classification.
///
/// A classifier failure is fatal to a run: once the model misbehaves no
/// later tile can be trusted either.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentationError {
    /// The tile cannot be fed to the classifier.
    #[error("Invalid classifier input: {0}")]
    InvalidInput(String),

    /// The classifier failed or returned unusable output.
    #[error("Classifier failed: {0}")]
    Classifier(String),
}
