//! Dataset handling
//!
//! - Layout discovery for `train`/`test`/`eval` split roots
//! - Fixed resize + ImageNet normalisation transform
//! - Burn `Dataset`/`Batcher` over class-per-directory image folders
//! - Data loader construction and the restartable [`BatchSource`] abstraction

pub mod burn_dataset;
pub mod layout;
pub mod loader;
pub mod source;
pub mod transform;

pub use burn_dataset::{ClassificationBatch, ClassificationBatcher, ImageFolder, ImageItem};
pub use layout::{list_class_dirs, parse_folder, FolderLayout, LayoutIssue, Split, SplitPaths};
pub use loader::{get_data_loader, LoaderOptions};
pub use source::BatchSource;
pub use transform::{ImageTransform, IMAGENET_MEAN, IMAGENET_STD};
