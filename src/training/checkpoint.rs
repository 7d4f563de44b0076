//! Parameter snapshots on disk
//!
//! Two kinds of files, both holding a full-precision module record:
//! - periodic snapshots: `{snapshot_dir}/model_epoch_{E}_batch_{B}.pth`
//! - best-model checkpoints: `{checkpoint_dir}/model_epoch_{E}.pth`
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! reader never sees a half-written file. Target directories are never
//! created here; a missing directory is a storage error.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::backend::Backend,
};
use tracing::debug;

use crate::utils::error::{Result, UniTrainError};

/// What a checkpoint file name describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    /// `model_epoch_{epoch}.pth`
    Best { epoch: usize },
    /// `model_epoch_{epoch}_batch_{batch}.pth`
    Snapshot { epoch: usize, batch: usize },
}

/// Path of the periodic snapshot for 1-indexed `epoch` and `batch`
pub fn snapshot_path(dir: &Path, epoch: usize, batch: usize) -> PathBuf {
    dir.join(format!("model_epoch_{}_batch_{}.pth", epoch, batch))
}

/// Path of the best-model checkpoint written after 1-indexed `epoch`
pub fn best_checkpoint_path(dir: &Path, epoch: usize) -> PathBuf {
    dir.join(format!("model_epoch_{}.pth", epoch))
}

/// Parse a checkpoint file name produced by this module
pub fn parse_checkpoint_name(filename: &str) -> Option<CheckpointKind> {
    let stem = filename
        .strip_prefix("model_epoch_")
        .and_then(|s| s.strip_suffix(".pth"))?;

    match stem.split_once("_batch_") {
        Some((epoch, batch)) => Some(CheckpointKind::Snapshot {
            epoch: epoch.parse().ok()?,
            batch: batch.parse().ok()?,
        }),
        None => Some(CheckpointKind::Best {
            epoch: stem.parse().ok()?,
        }),
    }
}

/// The best-model checkpoint with the highest epoch number in `dir`
///
/// Since best checkpoints are only written on improvement, this is the best
/// model of the most recent run that wrote into `dir`.
pub fn latest_best_checkpoint(dir: &Path) -> Result<Option<(usize, PathBuf)>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<(usize, PathBuf)> = None;
    for entry in fs::read_dir(dir).map_err(|e| UniTrainError::storage(dir, e))? {
        let path = entry.map_err(|e| UniTrainError::storage(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(CheckpointKind::Best { epoch }) = parse_checkpoint_name(name) {
            if latest.as_ref().map_or(true, |(best, _)| epoch > *best) {
                latest = Some((epoch, path));
            }
        }
    }
    Ok(latest)
}

/// Write `bytes` to `path` through a temporary sibling and a rename
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = result {
        // a failed write can leave a partial temp file behind
        let _ = fs::remove_file(&tmp);
        return Err(UniTrainError::storage(path, e));
    }
    Ok(())
}

/// Serialize the parameters of `model` to exactly `path`
pub fn save_weights<B: Backend, M: Module<B>>(model: &M, path: &Path) -> Result<()> {
    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
    let bytes = <NamedMpkBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
        &recorder,
        model.clone().into_record(),
        (),
    )
    .map_err(|e| UniTrainError::storage(path, e))?;

    atomic_write(path, &bytes)?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

/// Restore parameters saved by [`save_weights`] into `model`
///
/// The architecture of `model` must match the one that was saved.
pub fn load_weights<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    let bytes = fs::read(path).map_err(|e| UniTrainError::storage(path, e))?;
    let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
    let record = Recorder::<B>::load(&recorder, bytes, device)
        .map_err(|e| UniTrainError::storage(path, e))?;

    debug!("Loaded weights from {:?}", path);
    Ok(model.load_record(record))
}
