//! Single-image prediction
//!
//! The label vocabulary is the sorted list of class directories under a
//! training root, the same ordering used to assign labels during training.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{list_class_dirs, ImageTransform};
use crate::model::ImageClassifier;
use crate::utils::error::{Result, UniTrainError};

/// Class root used when none is given
pub const DEFAULT_CLASS_ROOT: &str = "content/data/train";

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class index
    pub index: usize,
    /// Predicted class name
    pub label: String,
    /// Softmax probability of the predicted class
    pub confidence: f32,
    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,
    pub inference_time_ms: f64,
}

impl Prediction {
    /// Top-k (index, label, probability) entries, most likely first
    pub fn top_k(&self, k: usize, classes: &[String]) -> Vec<(usize, String, f32)> {
        let mut indexed: Vec<(usize, f32)> = self.probabilities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed
            .into_iter()
            .take(k)
            .map(|(idx, prob)| {
                let name = classes.get(idx).cloned().unwrap_or_else(|| "Unknown".into());
                (idx, name, prob)
            })
            .collect()
    }
}

/// Runs a trained classifier on individual images
///
/// The model is an explicit handle: predicting before one is set is a
/// [`UniTrainError::State`] error.
///
/// Prediction never runs a backward pass. Use a bare backend here; a model
/// trained on an autodiff backend should be handed over as `model.valid()`
/// so the forward pass records no graph.
pub struct Predictor<B: Backend, M> {
    model: Option<M>,
    classes: Vec<String>,
    transform: ImageTransform,
    device: B::Device,
}

impl<B: Backend, M: ImageClassifier<B>> Predictor<B, M> {
    pub fn new(classes: Vec<String>, device: B::Device) -> Self {
        Self {
            model: None,
            classes,
            transform: ImageTransform::default(),
            device,
        }
    }

    /// Read the label vocabulary from the subdirectories of `class_root`
    pub fn from_class_root(class_root: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let class_root = class_root.as_ref();
        let classes =
            list_class_dirs(class_root).map_err(|e| UniTrainError::storage(class_root, e))?;
        debug!("Loaded {} class names from {:?}", classes.len(), class_root);
        Ok(Self::new(classes, device))
    }

    pub fn with_model(mut self, model: M) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_transform(mut self, transform: ImageTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Replace the current model, returning the previous one
    pub fn set_model(&mut self, model: M) -> Option<M> {
        self.model.replace(model)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Predict the class of one image
    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| UniTrainError::State("no model loaded for inference".into()))?;

        let start = Instant::now();
        let [channels, height, width] = self.transform.shape();
        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(self.transform.apply(image), [1, channels, height, width]),
            &self.device,
        );

        let logits = model.forward(input).detach();
        let probabilities: Vec<f32> = softmax(logits, 1)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| UniTrainError::computation(format!("{:?}", e)))?;

        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| UniTrainError::computation("model produced no class scores"))?;

        let label = self.classes.get(index).cloned().ok_or_else(|| {
            UniTrainError::configuration(format!(
                "predicted class {} but only {} class names are known",
                index,
                self.classes.len()
            ))
        })?;

        Ok(Prediction {
            index,
            label,
            confidence,
            probabilities,
            inference_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Decode the image at `path` and predict its class
    pub fn predict_path(&self, path: impl AsRef<Path>) -> Result<Prediction> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let image = ImageReader::open(&path)
            .map_err(|e| UniTrainError::storage(&path, e))?
            .decode()
            .map_err(|e| UniTrainError::Dataset(format!("{}: {}", path.display(), e)))?;
        self.predict(&image)
    }
}
