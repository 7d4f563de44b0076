//! Burn Dataset integration for class-per-directory image folders
//!
//! [`ImageFolder`] implements Burn's `Dataset` trait and resizes images on
//! demand; [`ClassificationBatcher`] stacks transformed items into tensors.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::layout::list_class_dirs;
use super::transform::ImageTransform;
use crate::utils::error::{Result, UniTrainError};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// A single transformed image ready for batching
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label index
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: PathBuf,
}

/// Labelled images under `split_dir/<class>/<file>`
///
/// Labels are assigned by sorted class directory name.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<(PathBuf, usize)>,
    transform: ImageTransform,
}

impl ImageFolder {
    /// Scan `split_dir` for class directories and their images
    ///
    /// Every image is fully decoded once here. Burn's loader treats a missing
    /// item as the end of the dataset, so a file that only fails at batch time
    /// would quietly shorten the epoch.
    pub fn new(split_dir: impl AsRef<Path>, transform: ImageTransform) -> Result<Self> {
        let root = split_dir.as_ref().to_path_buf();
        let classes = list_class_dirs(&root).map_err(|e| UniTrainError::storage(&root, e))?;

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let class_dir = root.join(class_name);
            let before = samples.len();

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !entry.file_type().is_file() || !is_image_file(path) {
                    continue;
                }
                image::open(path)
                    .map_err(|e| UniTrainError::Dataset(format!("{}: {}", path.display(), e)))?;
                samples.push((path.to_path_buf(), label));
            }

            let count = samples.len() - before;
            if count == 0 {
                warn!("Class '{}' has no images in {:?}", class_name, class_dir);
            }
            debug!("Class '{}' (label {}): {} images", class_name, label, count);
        }

        info!(
            "Indexed {} images in {} classes under {:?}",
            samples.len(),
            classes.len(),
            root
        );

        Ok(Self {
            root,
            classes,
            samples,
            transform,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class names in label order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn transform(&self) -> &ImageTransform {
        &self.transform
    }

    /// Number of samples per class, indexed by label
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for (_, label) in &self.samples {
            counts[*label] += 1;
        }
        counts
    }
}

impl Dataset<ImageItem> for ImageFolder {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let (path, label) = self.samples.get(index)?;
        match self.transform.load(path) {
            Ok(image) => Some(ImageItem {
                image,
                label: *label,
                path: path.clone(),
            }),
            Err(e) => {
                error!("Image became unreadable after indexing: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images for training or evaluation
#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassificationBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy both tensors to `device`
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            images: self.images.to_device(device),
            targets: self.targets.to_device(device),
        }
    }
}

/// Stacks already-normalised [`ImageItem`]s into a [`ClassificationBatch`]
#[derive(Clone, Debug)]
pub struct ClassificationBatcher<B: Backend> {
    device: B::Device,
    transform: ImageTransform,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(device: B::Device, transform: ImageTransform) -> Self {
        Self { device, transform }
    }
}

impl<B: Backend> Batcher<ImageItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ClassificationBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = self.transform.shape();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            &self.device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        ClassificationBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn write_image(path: &Path, color: [u8; 3]) {
        RgbImage::from_pixel(6, 6, Rgb(color)).save(path).unwrap();
    }

    fn make_folder(root: &Path) {
        for class in ["dog", "cat"] {
            fs::create_dir_all(root.join(class)).unwrap();
        }
        write_image(&root.join("cat").join("a.png"), [200, 10, 10]);
        write_image(&root.join("cat").join("b.png"), [180, 20, 20]);
        write_image(&root.join("dog").join("a.png"), [10, 10, 200]);
        fs::write(root.join("dog").join("readme.txt"), "not an image").unwrap();
    }

    #[test]
    fn test_labels_follow_sorted_class_names() {
        let tmp = TempDir::new().unwrap();
        make_folder(tmp.path());

        let folder = ImageFolder::new(tmp.path(), ImageTransform::with_image_size(4)).unwrap();
        assert_eq!(folder.classes(), &["cat".to_string(), "dog".to_string()]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_distribution(), vec![2, 1]);

        let item = folder.get(2).unwrap();
        assert_eq!(item.label, 1);
        assert_eq!(item.image.len(), 3 * 4 * 4);
    }

    #[test]
    fn test_corrupt_image_fails_at_construction() {
        let tmp = TempDir::new().unwrap();
        make_folder(tmp.path());
        fs::write(tmp.path().join("cat").join("broken.png"), b"garbage").unwrap();

        let result = ImageFolder::new(tmp.path(), ImageTransform::default());
        assert!(matches!(result, Err(UniTrainError::Dataset(_))));
    }

    #[test]
    fn test_truncated_image_fails_at_construction() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cat");
        fs::create_dir_all(&dir).unwrap();
        for i in 0..6u32 {
            let noisy = RgbImage::from_fn(32, 32, |x, y| {
                Rgb([(x * 7 + i) as u8, (y * 13) as u8, ((x ^ y) * 5) as u8])
            });
            noisy.save(dir.join(format!("{}.png", i))).unwrap();
        }
        // header stays intact, pixel data is cut short
        let truncated = dir.join("2.png");
        let bytes = fs::read(&truncated).unwrap();
        fs::write(&truncated, &bytes[..bytes.len() / 3]).unwrap();
        assert!(image::image_dimensions(&truncated).is_ok());

        let result = ImageFolder::new(tmp.path(), ImageTransform::with_image_size(4));
        assert!(matches!(result, Err(UniTrainError::Dataset(_))));
    }

    #[test]
    fn test_missing_split_dir_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let result = ImageFolder::new(tmp.path().join("train"), ImageTransform::default());
        assert!(matches!(result, Err(UniTrainError::Storage { .. })));
    }

    #[test]
    fn test_batcher_shapes() {
        let device = Default::default();
        let batcher = ClassificationBatcher::<TestBackend>::new(
            device,
            ImageTransform::with_image_size(2),
        );
        let items = vec![
            ImageItem {
                image: vec![0.5; 12],
                label: 0,
                path: PathBuf::from("a.png"),
            },
            ImageItem {
                image: vec![-0.5; 12],
                label: 3,
                path: PathBuf::from("b.png"),
            },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);
        assert_eq!(batch.len(), 2);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 3]);
    }
}
