//! Model capabilities shared by every architecture in the crate
//!
//! - [`ImageClassifier`]: image batch in, unnormalised logits out
//! - [`ReplaceableHead`]: architectures whose final linear layer can be swapped
//! - [`summarize_parameters`]: trainable/frozen parameter bookkeeping
//!
//! Training vs. evaluation mode is expressed through the backend: a module on
//! an autodiff backend trains, the module returned by
//! [`burn::module::AutodiffModule::valid`] evaluates.

use burn::{
    module::{Module, ModuleVisitor, ParamId},
    nn::Linear,
    tensor::{backend::Backend, Tensor},
};

/// A network mapping `[batch, channels, height, width]` images to
/// `[batch, num_classes]` logits
pub trait ImageClassifier<B: Backend> {
    /// Forward pass producing unnormalised logits (no softmax)
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Width of the logits produced by [`ImageClassifier::forward`]
    fn num_classes(&self) -> usize;
}

/// An architecture whose final fully-connected layer can be replaced
pub trait ReplaceableHead<B: Backend>: Module<B> {
    /// The final linear layer, if this architecture exposes one
    fn head(&self) -> Option<&Linear<B>>;

    /// Swap the final linear layer for `head`
    fn replace_head(self, head: Linear<B>) -> Self;
}

/// Input feature width of a linear layer
pub fn linear_in_features<B: Backend>(linear: &Linear<B>) -> usize {
    // Burn stores linear weights as [d_input, d_output]
    linear.weight.val().dims()[0]
}

/// Output feature width of a linear layer
pub fn linear_out_features<B: Backend>(linear: &Linear<B>) -> usize {
    linear.weight.val().dims()[1]
}

/// Parameter counts of a module, split by whether gradients are tracked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterSummary {
    /// Number of parameter tensors (including normalisation statistics)
    pub tensors: usize,
    /// Total scalar count
    pub total: usize,
    /// Scalars that receive gradients during training
    pub trainable: usize,
}

impl ParameterSummary {
    pub fn frozen(&self) -> usize {
        self.total - self.trainable
    }
}

#[derive(Default)]
struct ParameterCounter {
    summary: ParameterSummary,
}

impl<B: Backend> ModuleVisitor<B> for ParameterCounter {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let count = tensor.shape().num_elements();
        self.summary.tensors += 1;
        self.summary.total += count;
        if tensor.is_require_grad() {
            self.summary.trainable += count;
        }
    }
}

/// Count the parameters of `module`
///
/// Only modules living on an autodiff backend can report trainable
/// parameters; on an inference backend everything counts as frozen.
pub fn summarize_parameters<B: Backend, M: Module<B>>(module: &M) -> ParameterSummary {
    let mut counter = ParameterCounter::default();
    module.visit(&mut counter);
    counter.summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::LinearConfig;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_linear_feature_widths() {
        let device = Default::default();
        let linear = LinearConfig::new(512, 7).init::<TestBackend>(&device);

        assert_eq!(linear_in_features(&linear), 512);
        assert_eq!(linear_out_features(&linear), 7);
    }

    #[test]
    fn test_summary_counts_weights_and_bias() {
        let device = Default::default();
        let linear = LinearConfig::new(4, 3).init::<TestBackend>(&device);

        let summary = summarize_parameters(&linear);
        assert_eq!(summary.tensors, 2);
        assert_eq!(summary.total, (4 + 1) * 3);
        assert_eq!(summary.trainable, summary.total);
        assert_eq!(summary.frozen(), 0);
    }

    #[test]
    fn test_no_grad_freezes_everything() {
        let device = Default::default();
        let linear = LinearConfig::new(4, 3).init::<TestBackend>(&device).no_grad();

        let summary = summarize_parameters(&linear);
        assert_eq!(summary.trainable, 0);
        assert_eq!(summary.frozen(), 15);
    }
}
