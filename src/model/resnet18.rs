//! ResNet-18 backbone
//!
//! Classic architecture with residual connections, in the usual layout:
//! - Input: 224x224x3
//! - Conv1: 7x7, stride 2
//! - MaxPool: 3x3, stride 2
//! - 4 residual stages (2 basic blocks each)
//! - Global average pooling
//! - FC layer
//!
//! This is the default backbone for transfer learning. Its "pretrained"
//! weights are a raw parameter snapshot loaded through
//! [`crate::training::checkpoint::load_weights`].

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::classifier::{linear_out_features, ImageClassifier, ReplaceableHead};
use crate::utils::error::UniTrainError;

const LAYER_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// Configuration for [`ResNet18`]
#[derive(Config, Debug)]
pub struct ResNet18Config {
    /// Number of output logits (1000 matches the ImageNet head)
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Basic blocks per stage
    #[config(default = "[2, 2, 2, 2]")]
    pub layers: [usize; 4],
}

impl ResNet18Config {
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<ResNet18<B>> {
        if self.num_classes == 0 {
            return Err(UniTrainError::configuration(
                "num_classes must be greater than 0",
            ));
        }
        if self.layers.iter().any(|&n| n == 0) {
            return Err(UniTrainError::configuration(
                "every ResNet-18 stage needs at least one block",
            ));
        }
        Ok(ResNet18::new(self, device))
    }
}

/// 1x1 projection applied to the identity path when the shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Residual basic block: `relu(bn(conv(relu(bn(conv(x))))) + identity)`
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1: Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: Conv2dConfig::new([out_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.conv1.forward(x);
        let out = self.bn1.forward(out);
        let out = self.activation.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        self.activation.forward(out.add(identity))
    }

    pub fn has_downsample(&self) -> bool {
        self.downsample.is_some()
    }
}

/// ResNet-18 classifier
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    maxpool: MaxPool2d,
    layers: Vec<Vec<BasicBlock<B>>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
    num_classes: usize,
}

impl<B: Backend> ResNet18<B> {
    fn new(config: &ResNet18Config, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = BatchNormConfig::new(64).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut in_channels = 64;
        let mut layers = Vec::with_capacity(LAYER_WIDTHS.len());
        for (index, (&width, &num_blocks)) in
            LAYER_WIDTHS.iter().zip(config.layers.iter()).enumerate()
        {
            let stride = if index == 0 { 1 } else { 2 };
            let mut blocks = Vec::with_capacity(num_blocks);
            blocks.push(BasicBlock::new(in_channels, width, stride, device));
            for _ in 1..num_blocks {
                blocks.push(BasicBlock::new(width, width, 1, device));
            }
            in_channels = width;
            layers.push(blocks);
        }

        Self {
            conv1,
            bn1,
            maxpool,
            layers,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(in_channels, config.num_classes).init(device),
            activation: Relu::new(),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.maxpool.forward(x);

        let x = self
            .layers
            .iter()
            .flatten()
            .fold(x, |x, block| block.forward(x));

        // Flatten [batch, channels, 1, 1] -> [batch, channels]
        let x = self.avgpool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);

        self.fc.forward(x)
    }

    pub fn layers(&self) -> &[Vec<BasicBlock<B>>] {
        &self.layers
    }
}

impl<B: Backend> ImageClassifier<B> for ResNet18<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        ResNet18::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> ReplaceableHead<B> for ResNet18<B> {
    fn head(&self) -> Option<&Linear<B>> {
        Some(&self.fc)
    }

    fn replace_head(mut self, head: Linear<B>) -> Self {
        self.num_classes = linear_out_features(&head);
        self.fc = head;
        self
    }
}
