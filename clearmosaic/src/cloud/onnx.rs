//! ONNX Runtime classifier.

use std::path::Path;

use ort::session::Session;
use parking_lot::Mutex;
use tracing::info;

use super::segment::{ClassScores, ClassifierInput, CloudClassifier, CLASS_COUNT};
use super::SegmentationError;

/// Input tensor name of the exported cloud model.
pub const DEFAULT_INPUT_NAME: &str = "x.1";

/// Cloud classifier running an ONNX model.
///
/// The session needs exclusive access per run, so concurrent workers take
/// turns on it.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
}

impl OnnxClassifier {
    /// Loads the model at `path`.
    pub fn from_file(path: &Path) -> Result<Self, SegmentationError> {
        info!(path = %path.display(), "Loading cloud model");
        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(model_error)?;

        Ok(Self {
            session: Mutex::new(session),
            input_name: DEFAULT_INPUT_NAME.to_string(),
        })
    }

    /// Overrides the input tensor name.
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }
}

impl CloudClassifier for OnnxClassifier {
    fn classify(&self, input: &ClassifierInput) -> Result<ClassScores, SegmentationError> {
        let shape = input.shape();
        let value = ort::value::Value::from_array((
            shape.as_slice(),
            input.data.clone().into_boxed_slice(),
        ))
        .map_err(model_error)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(model_error)?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(model_error)?;

        let plane = input.size as usize * input.size as usize;
        if data.len() != CLASS_COUNT * plane {
            return Err(SegmentationError::Classifier(format!(
                "model produced {} scores, expected {}",
                data.len(),
                CLASS_COUNT * plane
            )));
        }

        Ok(ClassScores {
            size: input.size,
            data: data.to_vec(),
        })
    }
}

fn model_error(e: impl std::fmt::Display) -> SegmentationError {
    SegmentationError::Classifier(e.to_string())
}
