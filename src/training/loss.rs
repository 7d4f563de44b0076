//! Loss functions usable by the training engine

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    tensor::{backend::Backend, Int, Tensor},
};

/// Scalar training objective over logits and integer class targets
pub trait LossFunction<B: Backend> {
    /// Returns a single-element loss tensor
    fn loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

impl<B: Backend> LossFunction<B> for CrossEntropyLoss<B> {
    fn loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        self.forward(logits, targets)
    }
}

/// Plain cross-entropy (no label smoothing, no class weights)
pub fn cross_entropy<B: Backend>(device: &B::Device) -> CrossEntropyLoss<B> {
    CrossEntropyLossConfig::new().init(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray;

    #[test]
    fn test_uniform_logits_give_log_num_classes() {
        let device = Default::default();
        let loss_fn = cross_entropy::<TestBackend>(&device);

        let logits = Tensor::<TestBackend, 2>::zeros([2, 4], &device);
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0i64, 3]), &device);

        let loss: f64 = loss_fn.loss(logits, targets).into_scalar().elem();
        assert!((loss - (4.0f64).ln()).abs() < 1e-5);
    }
}
