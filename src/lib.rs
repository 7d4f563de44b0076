//! # UniTrain
//!
//! Image-classification training orchestration on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: train/test/eval layout checks, image folders, data loaders
//! - `model`: ResNet9, ResNet18 and the transfer-learning adapter
//! - `training`: the training engine, evaluation, checkpoints and run tracking
//! - `inference`: single-image prediction
//! - `utils`: logging, errors and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use unitrain::dataset::{get_data_loader, parse_folder, LoaderOptions, Split};
//! use unitrain::model::ResNet9Config;
//! use unitrain::training::{NoopTracker, Trainer, TrainingConfig};
//!
//! let paths = parse_folder("data").into_result()?;
//! let (train, classes) = get_data_loader(paths.path(Split::Train), Split::Train, &options, &device)?;
//! let model = ResNet9Config::new(classes.len()).init(&device)?;
//! let outcome = Trainer::new(TrainingConfig::default(), device)?
//!     .fit(model, optimizer, &train, &valid, &mut NoopTracker)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

pub use dataset::{parse_folder, FolderLayout, Split, SplitPaths};
pub use inference::{Prediction, Predictor};
pub use model::{ImageClassifier, ReplaceableHead, ResNet18, ResNet9};
pub use training::{evaluate_model, Trainer, TrainingConfig};
pub use utils::error::{Result, UniTrainError};

/// Side length of the square model input after resizing
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
