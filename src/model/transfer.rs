//! Transfer learning
//!
//! Adapts an existing architecture to a new class count: optionally load
//! pretrained parameters, optionally freeze everything, then swap the final
//! linear layer for a fresh `in_features -> num_classes` head.

use std::path::PathBuf;

use burn::{
    module::Module,
    nn::LinearConfig,
    tensor::backend::Backend,
};
use tracing::{debug, info};

use super::classifier::{linear_in_features, summarize_parameters, ReplaceableHead};
use super::resnet18::{ResNet18, ResNet18Config};
use super::resnet9::{ResNet9, ResNet9Config};
use crate::training::checkpoint::load_weights;
use crate::utils::error::{Result, UniTrainError};

/// Something that can instantiate an architecture, with or without
/// pretrained parameters
pub trait ArchitectureFactory<B: Backend> {
    type Model: ReplaceableHead<B>;

    /// Short architecture name used in logs
    fn name(&self) -> &str;

    /// Build a fresh instance
    ///
    /// Must fail with [`UniTrainError::Configuration`] when `use_pretrained`
    /// is requested but no pretrained parameters are available.
    fn build(&self, use_pretrained: bool, device: &B::Device) -> Result<Self::Model>;
}

fn missing_weights(name: &str) -> UniTrainError {
    UniTrainError::configuration(format!(
        "no pretrained weights configured for {}",
        name
    ))
}

/// ResNet-18 with an optional pretrained parameter snapshot
#[derive(Debug, Clone)]
pub struct ResNet18Factory {
    pub config: ResNet18Config,
    pub weights: Option<PathBuf>,
}

impl Default for ResNet18Factory {
    fn default() -> Self {
        Self {
            config: ResNet18Config::new(),
            weights: None,
        }
    }
}

impl ResNet18Factory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights = Some(path.into());
        self
    }
}

impl<B: Backend> ArchitectureFactory<B> for ResNet18Factory {
    type Model = ResNet18<B>;

    fn name(&self) -> &str {
        "resnet18"
    }

    fn build(&self, use_pretrained: bool, device: &B::Device) -> Result<ResNet18<B>> {
        let model = self.config.init(device)?;
        if !use_pretrained {
            return Ok(model);
        }
        let path = self
            .weights
            .as_ref()
            .ok_or_else(|| missing_weights("resnet18"))?;
        load_weights(model, path, device)
    }
}

/// ResNet9, so a previously trained network can be adapted to a new task
#[derive(Debug, Clone)]
pub struct ResNet9Factory {
    pub config: ResNet9Config,
    pub weights: Option<PathBuf>,
}

impl ResNet9Factory {
    /// `num_classes` must match the snapshot being loaded, not the target task
    pub fn new(num_classes: usize) -> Self {
        Self {
            config: ResNet9Config::new(num_classes),
            weights: None,
        }
    }

    pub fn with_weights(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights = Some(path.into());
        self
    }
}

impl<B: Backend> ArchitectureFactory<B> for ResNet9Factory {
    type Model = ResNet9<B>;

    fn name(&self) -> &str {
        "resnet9"
    }

    fn build(&self, use_pretrained: bool, device: &B::Device) -> Result<ResNet9<B>> {
        let model = self.config.init(device)?;
        if !use_pretrained {
            return Ok(model);
        }
        let path = self
            .weights
            .as_ref()
            .ok_or_else(|| missing_weights("resnet9"))?;
        load_weights(model, path, device)
    }
}

/// Build a model for `num_classes` from an existing architecture
///
/// With `feature_extract`, every parameter of the instantiated architecture is
/// frozen before the head is replaced, so only the new head trains.
pub fn create_transfer_learning_model<B, F>(
    num_classes: usize,
    factory: &F,
    feature_extract: bool,
    use_pretrained: bool,
    device: &B::Device,
) -> Result<F::Model>
where
    B: Backend,
    F: ArchitectureFactory<B>,
{
    if num_classes == 0 {
        return Err(UniTrainError::configuration(
            "num_classes must be greater than 0",
        ));
    }

    let model = factory.build(use_pretrained, device)?;

    let in_features = match model.head() {
        Some(head) => linear_in_features(head),
        None => {
            return Err(UniTrainError::configuration(format!(
                "{} does not expose a replaceable final linear layer",
                factory.name()
            )))
        }
    };

    let model = if feature_extract { model.no_grad() } else { model };

    let head = LinearConfig::new(in_features, num_classes).init(device);
    let model = model.replace_head(head);

    let summary = summarize_parameters(&model);
    info!(
        "Adapted {} to {} classes (pretrained: {}, feature extraction: {})",
        factory.name(),
        num_classes,
        use_pretrained,
        feature_extract
    );
    debug!(
        "Parameters: {} total, {} trainable",
        summary.total, summary.trainable
    );

    Ok(model)
}
