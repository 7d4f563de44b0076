//! Training hyperparameters and output locations

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, UniTrainError};

/// Configuration for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub num_epochs: usize,

    /// Batch size for training
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Random seed for reproducibility
    pub seed: u64,

    /// Write a snapshot and report the mean loss every N batches
    pub snapshot_interval: usize,

    /// Directory receiving `model_epoch_{N}.pth` on validation improvement
    pub checkpoint_dir: PathBuf,

    /// Directory receiving periodic `model_epoch_{E}_batch_{B}.pth` snapshots
    pub snapshot_dir: PathBuf,

    /// Number of data loading workers
    pub num_workers: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            seed: 42,
            snapshot_interval: 100,
            checkpoint_dir: PathBuf::from("checkpoints"),
            snapshot_dir: PathBuf::from("checkpoints/snapshots"),
            num_workers: 4,
        }
    }
}

impl TrainingConfig {
    /// Reject values the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            return Err(UniTrainError::configuration("num_epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(UniTrainError::configuration("batch_size must be at least 1"));
        }
        if self.snapshot_interval == 0 {
            return Err(UniTrainError::configuration(
                "snapshot_interval must be at least 1",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(UniTrainError::configuration(format!(
                "learning_rate must be a positive number (got {})",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| UniTrainError::storage(path, e))
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| UniTrainError::storage(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.snapshot_interval, 100);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for config in [
            TrainingConfig {
                num_epochs: 0,
                ..Default::default()
            },
            TrainingConfig {
                snapshot_interval: 0,
                ..Default::default()
            },
            TrainingConfig {
                learning_rate: f64::NAN,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(UniTrainError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("train.json");
        std::fs::write(&path, r#"{ "num_epochs": 3, "learning_rate": 0.01 }"#).unwrap();

        let config = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("train.json");
        let config = TrainingConfig {
            seed: 7,
            ..Default::default()
        };

        config.save(&path).unwrap();
        assert_eq!(TrainingConfig::load(&path).unwrap(), config);
    }
}
