//! Error Handling Module
//!
//! Defines the error taxonomy for UniTrain. Uses thiserror for ergonomic
//! error definitions.
//!
//! `parse_folder` reports layout problems through
//! [`crate::dataset::FolderLayout::Invalid`]; [`UniTrainError::DatasetLayout`]
//! only appears once a caller converts that into a `Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for UniTrain operations
#[derive(Error, Debug)]
pub enum UniTrainError {
    /// Invalid model/factory wiring or invalid hyperparameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Checkpoint or log write/read failure
    #[error("Storage error at '{path}': {message}")]
    Storage { path: PathBuf, message: String },

    /// Forward/backward failure (shape mismatch, bad labels, non-finite loss)
    #[error("Computation error: {0}")]
    Computation(String),

    /// Accuracy requested over a data source that produced no examples
    #[error("Division error: {0}")]
    Division(String),

    /// Operation attempted in a state where it is not valid
    #[error("State error: {0}")]
    State(String),

    /// Malformed train/test/eval directory structure
    #[error("Dataset layout error: {0}")]
    DatasetLayout(String),

    /// Error loading or indexing dataset images
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl UniTrainError {
    pub fn storage(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<serde_json::Error> for UniTrainError {
    fn from(err: serde_json::Error) -> Self {
        UniTrainError::Serialization(err.to_string())
    }
}

/// Convenience Result type for UniTrain operations
pub type Result<T> = std::result::Result<T, UniTrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UniTrainError::Computation("logits have 3 rows, labels 4".to_string());
        assert_eq!(
            format!("{}", err),
            "Computation error: logits have 3 rows, labels 4"
        );
    }

    #[test]
    fn test_storage_error_mentions_path() {
        let err = UniTrainError::storage("/missing/model_epoch_1.pth", "No such file or directory");
        let msg = format!("{}", err);
        assert!(msg.contains("model_epoch_1.pth"));
        assert!(msg.contains("No such file"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: UniTrainError = io.into();
        assert!(matches!(err, UniTrainError::Io(_)));
    }
}
