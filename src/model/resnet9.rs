//! ResNet9 Architecture
//!
//! A compact stacked-block network for image classification:
//!
//! ```text
//! stem:    conv3x3(in -> 64) -> BN -> ReLU
//! stage 1: 2 blocks,  64 channels, stride 1
//! stage 2: 2 blocks, 128 channels, stride 2 (first block)
//! stage 3: 2 blocks, 256 channels, stride 2 (first block)
//! stage 4: 2 blocks, 512 channels, stride 2 (first block)
//! head:    global average pool -> linear(512 -> num_classes)
//! ```
//!
//! Each block is conv -> BN -> ReLU -> conv -> BN. The block output is NOT
//! added to its input: despite the historical "residual" name these are plain
//! stacked blocks.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::classifier::{linear_out_features, ImageClassifier, ReplaceableHead};
use crate::utils::error::UniTrainError;

/// Output width of the stem convolution
pub const STEM_CHANNELS: usize = 64;

/// Output width of each stage, in order
pub const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// Stride of each stage's first block
pub const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// Configuration for [`ResNet9`]
#[derive(Config, Debug)]
pub struct ResNet9Config {
    /// Number of output logits
    pub num_classes: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Blocks stacked in every stage
    #[config(default = "2")]
    pub blocks_per_stage: usize,
}

impl ResNet9Config {
    /// Assemble the network
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<ResNet9<B>> {
        ResNet9::new(self, device)
    }
}

/// conv(3x3) -> BN -> ReLU -> conv(3x3) -> BN, without a skip connection
///
/// The second normalisation is not followed by an activation; the next layer
/// decides whether to activate.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    activation: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        self.bn2.forward(x)
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// 3x3 convolution without bias (the following batch norm absorbs the shift)
fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// Build one block mapping `in_channels` to `out_channels`
///
/// `stride` applies to the first convolution only.
pub fn build_residual_block<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    device: &B::Device,
) -> crate::Result<ResidualBlock<B>> {
    if in_channels == 0 || out_channels == 0 {
        return Err(UniTrainError::configuration(format!(
            "block channel counts must be positive (got {} -> {})",
            in_channels, out_channels
        )));
    }
    if stride == 0 {
        return Err(UniTrainError::configuration("block stride must be at least 1"));
    }

    Ok(ResidualBlock {
        conv1: conv3x3(in_channels, out_channels, stride, device),
        bn1: BatchNormConfig::new(out_channels).init(device),
        activation: Relu::new(),
        conv2: conv3x3(out_channels, out_channels, 1, device),
        bn2: BatchNormConfig::new(out_channels).init(device),
        in_channels,
        out_channels,
        stride,
    })
}

/// A run of blocks sharing one output width
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
    out_channels: usize,
}

impl<B: Backend> Stage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn blocks(&self) -> &[ResidualBlock<B>] {
        &self.blocks
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

/// Tracks the channel width flowing between stages while they are assembled
#[derive(Debug, Clone, Copy)]
pub struct StageBuilder {
    in_channels: usize,
}

impl StageBuilder {
    pub fn new(in_channels: usize) -> Self {
        Self { in_channels }
    }

    /// Width the next stage will receive
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Build a stage of `num_blocks` blocks ending at `out_channels`
    ///
    /// Only the first block changes width or applies `stride`; the rest run at
    /// stride 1 with `in == out == out_channels`.
    pub fn build<B: Backend>(
        &mut self,
        out_channels: usize,
        num_blocks: usize,
        stride: usize,
        device: &B::Device,
    ) -> crate::Result<Stage<B>> {
        if num_blocks == 0 {
            return Err(UniTrainError::configuration(
                "a stage needs at least one block",
            ));
        }

        let mut blocks = Vec::with_capacity(num_blocks);
        blocks.push(build_residual_block(
            self.in_channels,
            out_channels,
            stride,
            device,
        )?);
        self.in_channels = out_channels;

        for _ in 1..num_blocks {
            blocks.push(build_residual_block(
                self.in_channels,
                out_channels,
                1,
                device,
            )?);
        }

        Ok(Stage {
            blocks,
            out_channels,
        })
    }
}

/// ResNet9-style classifier
#[derive(Module, Debug)]
pub struct ResNet9<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    activation: Relu,
    stages: Vec<Stage<B>>,
    avg_pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ResNet9<B> {
    /// Assemble the network from configuration
    pub fn new(config: &ResNet9Config, device: &B::Device) -> crate::Result<Self> {
        if config.num_classes == 0 {
            return Err(UniTrainError::configuration(
                "num_classes must be greater than 0",
            ));
        }
        if config.in_channels == 0 {
            return Err(UniTrainError::configuration(
                "in_channels must be greater than 0",
            ));
        }

        let stem_conv = conv3x3(config.in_channels, STEM_CHANNELS, 1, device);
        let stem_bn = BatchNormConfig::new(STEM_CHANNELS).init(device);

        let mut builder = StageBuilder::new(STEM_CHANNELS);
        let stages = STAGE_WIDTHS
            .iter()
            .zip(STAGE_STRIDES.iter())
            .map(|(&width, &stride)| {
                builder.build(width, config.blocks_per_stage, stride, device)
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let avg_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(builder.in_channels(), config.num_classes).init(device);

        Ok(Self {
            stem_conv,
            stem_bn,
            activation: Relu::new(),
            stages,
            avg_pool,
            fc,
            num_classes: config.num_classes,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem_conv.forward(x);
        let x = self.stem_bn.forward(x);
        let x = self.activation.forward(x);

        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.avg_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    pub fn stages(&self) -> &[Stage<B>] {
        &self.stages
    }

    /// Output width of each stage, in order
    pub fn stage_widths(&self) -> Vec<usize> {
        self.stages.iter().map(Stage::out_channels).collect()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> ImageClassifier<B> for ResNet9<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        ResNet9::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> ReplaceableHead<B> for ResNet9<B> {
    fn head(&self) -> Option<&Linear<B>> {
        Some(&self.fc)
    }

    fn replace_head(mut self, head: Linear<B>) -> Self {
        self.num_classes = linear_out_features(&head);
        self.fc = head;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::classifier::linear_in_features;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_resnet9_output_shape() {
        let device = Default::default();
        let model = ResNet9Config::new(10).init::<TestBackend>(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 10]);
    }

    #[test]
    fn test_stage_widths_and_head() {
        let device = Default::default();
        for num_classes in [1, 2, 39] {
            let model = ResNet9Config::new(num_classes)
                .init::<TestBackend>(&device)
                .unwrap();

            assert_eq!(model.stage_widths(), vec![64, 128, 256, 512]);
            assert_eq!(linear_in_features(&model.fc), 512);
            assert_eq!(model.num_classes(), num_classes);
        }
    }

    #[test]
    fn test_only_first_block_of_a_stage_strides() {
        let device = Default::default();
        let model = ResNet9Config::new(4)
            .with_blocks_per_stage(3)
            .init::<TestBackend>(&device)
            .unwrap();

        let mut expected_in = STEM_CHANNELS;
        for (stage, &stride) in model.stages().iter().zip(STAGE_STRIDES.iter()) {
            let blocks = stage.blocks();
            assert_eq!(blocks.len(), 3);

            assert_eq!(blocks[0].in_channels(), expected_in);
            assert_eq!(blocks[0].out_channels(), stage.out_channels());
            assert_eq!(blocks[0].stride(), stride);

            for block in &blocks[1..] {
                assert_eq!(block.stride(), 1);
                assert_eq!(block.in_channels(), block.out_channels());
                assert_eq!(block.out_channels(), stage.out_channels());
            }
            expected_in = stage.out_channels();
        }
    }

    #[test]
    fn test_stage_widths_never_decrease() {
        let device = Default::default();
        let model = ResNet9Config::new(3).init::<TestBackend>(&device).unwrap();

        let widths = model.stage_widths();
        assert!(widths.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_stage_builder_tracks_channels() {
        let device = Default::default();
        let mut builder = StageBuilder::new(64);

        let stage: Stage<TestBackend> = builder.build(128, 2, 2, &device).unwrap();
        assert_eq!(builder.in_channels(), 128);
        assert_eq!(stage.blocks()[0].in_channels(), 64);
        assert_eq!(stage.blocks()[1].in_channels(), 128);
    }

    #[test]
    fn test_block_halves_spatial_size_with_stride_two() {
        let device = Default::default();
        let block = build_residual_block::<TestBackend>(8, 16, 2, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 8, 8, 8], &device);
        assert_eq!(block.forward(input).dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn test_invalid_block_arguments_are_rejected() {
        let device = Default::default();
        assert!(build_residual_block::<TestBackend>(0, 16, 1, &device).is_err());
        assert!(build_residual_block::<TestBackend>(16, 0, 1, &device).is_err());
        assert!(matches!(
            build_residual_block::<TestBackend>(16, 16, 0, &device),
            Err(UniTrainError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_classes_is_a_configuration_error() {
        let device = Default::default();
        let result = ResNet9Config::new(0).init::<TestBackend>(&device);
        assert!(matches!(result, Err(UniTrainError::Configuration(_))));
    }

    #[test]
    fn test_empty_stage_is_rejected() {
        let device = Default::default();
        let mut builder = StageBuilder::new(64);
        assert!(builder.build::<TestBackend>(64, 0, 1, &device).is_err());
    }

    #[test]
    fn test_replace_head_updates_class_count() {
        let device = Default::default();
        let model = ResNet9Config::new(10).init::<TestBackend>(&device).unwrap();

        let model = model.replace_head(LinearConfig::new(512, 3).init(&device));
        assert_eq!(model.num_classes(), 3);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 16], &device);
        assert_eq!(model.forward(input).dims(), [1, 3]);
    }

    #[test]
    fn test_config_reloads_from_json() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("resnet9.json");
        ResNet9Config::new(5)
            .with_blocks_per_stage(3)
            .save(&path)
            .unwrap();

        let loaded = ResNet9Config::load(&path).unwrap();
        assert_eq!(loaded.num_classes, 5);
        assert_eq!(loaded.blocks_per_stage, 3);
        assert_eq!(loaded.in_channels, 3);
    }
}
