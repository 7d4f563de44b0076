//! Model architectures
//!
//! - ResNet9: stacked conv blocks assembled stage by stage
//! - ResNet18: residual backbone used as the default transfer-learning base
//! - Transfer learning adapter that freezes a backbone and swaps its head

pub mod classifier;
pub mod resnet18;
pub mod resnet9;
pub mod transfer;

pub use classifier::{
    linear_in_features, linear_out_features, summarize_parameters, ImageClassifier,
    ParameterSummary, ReplaceableHead,
};
pub use resnet18::{ResNet18, ResNet18Config};
pub use resnet9::{build_residual_block, ResNet9, ResNet9Config, ResidualBlock, Stage, StageBuilder};
pub use transfer::{
    create_transfer_learning_model, ArchitectureFactory, ResNet18Factory, ResNet9Factory,
};
