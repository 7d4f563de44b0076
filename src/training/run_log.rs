//! Plain-text run log
//!
//! One line per record:
//! `2024-01-31 15:45:02 - Epoch 3 - Train Acc: 81.2500 - Val Acc: 78.0000 - <message>`

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::utils::error::{Result, UniTrainError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render one run-log line (without the trailing newline)
pub fn format_record(
    timestamp: &DateTime<Local>,
    epoch: usize,
    train_accuracy: f64,
    val_accuracy: f64,
    message: &str,
) -> String {
    format!(
        "{} - Epoch {} - Train Acc: {:.4} - Val Acc: {:.4} - {}",
        timestamp.format(TIMESTAMP_FORMAT),
        epoch,
        train_accuracy,
        val_accuracy,
        message
    )
}

/// File sink for run records, truncated when created
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| UniTrainError::storage(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record stamped with the current local time
    pub fn record(
        &mut self,
        epoch: usize,
        train_accuracy: f64,
        val_accuracy: f64,
        message: &str,
    ) -> Result<()> {
        let line = format_record(&Local::now(), epoch, train_accuracy, val_accuracy, message);
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| UniTrainError::storage(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_record_format() {
        let timestamp = Local.with_ymd_and_hms(2024, 1, 31, 15, 45, 2).unwrap();
        assert_eq!(
            format_record(&timestamp, 3, 81.25, 78.0, "Saved best model"),
            "2024-01-31 15:45:02 - Epoch 3 - Train Acc: 81.2500 - Val Acc: 78.0000 - Saved best model"
        );
    }

    #[test]
    fn test_log_is_truncated_on_create() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("training.log");
        std::fs::write(&path, "old run\n").unwrap();

        let mut log = RunLog::create(&path).unwrap();
        log.record(1, 50.0, 40.0, "epoch finished").unwrap();
        log.record(2, 60.0, 55.5, "epoch finished").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" - Epoch 1 - Train Acc: 50.0000 - Val Acc: 40.0000 - epoch finished"));
        assert!(lines[1].contains("Val Acc: 55.5000"));
        assert!(!content.contains("old run"));
    }

    #[test]
    fn test_missing_directory_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let result = RunLog::create(tmp.path().join("nope").join("training.log"));
        assert!(matches!(result, Err(UniTrainError::Storage { .. })));
    }
}
