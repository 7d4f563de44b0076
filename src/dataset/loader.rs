//! Data loader construction for a named split of a dataset root

use std::path::Path;
use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use tracing::info;

use super::burn_dataset::{ClassificationBatch, ClassificationBatcher, ImageFolder};
use super::layout::Split;
use super::transform::ImageTransform;
use crate::utils::error::{Result, UniTrainError};

/// Options for [`get_data_loader`]
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Seed for shuffling; `None` keeps directory order
    pub shuffle: Option<u64>,
    pub transform: ImageTransform,
    pub num_workers: usize,
}

impl LoaderOptions {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: None,
            transform: ImageTransform::default(),
            num_workers: 1,
        }
    }

    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = Some(seed);
        self
    }

    pub fn with_transform(mut self, transform: ImageTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }
}

/// Build a data loader over `{data_dir}/{split}`
///
/// Also returns the class names in label order so callers can size the
/// classifier head.
pub fn get_data_loader<B: Backend>(
    data_dir: impl AsRef<Path>,
    split: Split,
    options: &LoaderOptions,
    device: &B::Device,
) -> Result<(Arc<dyn DataLoader<ClassificationBatch<B>>>, Vec<String>)> {
    if options.batch_size == 0 {
        return Err(UniTrainError::configuration("batch_size must be at least 1"));
    }

    let split_dir = data_dir.as_ref().join(split.dir_name());
    let dataset = ImageFolder::new(&split_dir, options.transform)?;
    if dataset.is_empty() {
        return Err(UniTrainError::Dataset(format!(
            "no images found in {}",
            split_dir.display()
        )));
    }
    let classes = dataset.classes().to_vec();

    info!(
        "{} loader: {} images, batch size {}, shuffle {:?}",
        split,
        dataset.len(),
        options.batch_size,
        options.shuffle
    );

    let batcher = ClassificationBatcher::<B>::new(device.clone(), options.transform);
    let builder = DataLoaderBuilder::new(batcher)
        .batch_size(options.batch_size)
        .num_workers(options.num_workers.max(1));
    let builder = match options.shuffle {
        Some(seed) => builder.shuffle(seed),
        None => builder,
    };

    Ok((builder.build(dataset), classes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::source::BatchSource;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_loader_batches_split() {
        let tmp = TempDir::new().unwrap();
        for (class, n) in [("cat", 3), ("dog", 2)] {
            let dir = tmp.path().join("train").join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..n {
                RgbImage::from_pixel(5, 5, Rgb([i as u8, 0, 0]))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
        }

        let options = LoaderOptions::new(2)
            .with_transform(ImageTransform::with_image_size(4))
            .with_shuffle(7);
        let (loader, classes) =
            get_data_loader::<TestBackend>(tmp.path(), Split::Train, &options, &Default::default())
                .unwrap();

        assert_eq!(classes, vec!["cat", "dog"]);
        let sizes: Vec<usize> = loader.batches().map(|b| b.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 5);
        assert_eq!(sizes.len(), 3);
    }

    #[test]
    fn test_truncated_image_rejects_the_split() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("test").join("cat");
        fs::create_dir_all(&dir).unwrap();
        for i in 0..6u32 {
            RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 11 + i) as u8, (y * 3) as u8, (x + y) as u8]))
                .save(dir.join(format!("{}.png", i)))
                .unwrap();
        }
        let broken = dir.join("2.png");
        let bytes = fs::read(&broken).unwrap();
        fs::write(&broken, &bytes[..bytes.len() / 3]).unwrap();

        let options = LoaderOptions::new(2).with_transform(ImageTransform::with_image_size(4));
        let result =
            get_data_loader::<TestBackend>(tmp.path(), Split::Test, &options, &Default::default());
        assert!(matches!(result, Err(UniTrainError::Dataset(_))));
    }

    #[test]
    fn test_empty_split_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("eval").join("cat")).unwrap();

        let result = get_data_loader::<TestBackend>(
            tmp.path(),
            Split::Eval,
            &LoaderOptions::new(4),
            &Default::default(),
        );
        assert!(matches!(result, Err(UniTrainError::Dataset(_))));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let result = get_data_loader::<TestBackend>(
            "/nowhere",
            Split::Test,
            &LoaderOptions::new(0),
            &Default::default(),
        );
        assert!(matches!(result, Err(UniTrainError::Configuration(_))));
    }
}
