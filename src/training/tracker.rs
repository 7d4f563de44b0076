//! Experiment tracking
//!
//! A tracker is an explicit handle owned by one training run:
//! `start_run` once, `log` any number of times, `finish` once.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::utils::error::{Result, UniTrainError};

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Identity and hyperparameters of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_name: String,
    pub params: BTreeMap<String, String>,
}

impl RunInfo {
    /// A run named after the current local time, e.g. `run_20240131_154502`
    pub fn timestamped() -> Self {
        Self::new(Local::now().format("run_%Y%m%d_%H%M%S").to_string())
    }

    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_name: run_name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }
}

/// Sink for per-run metrics
pub trait ExperimentTracker {
    fn start_run(&mut self, info: &RunInfo) -> Result<()>;

    /// Record named scalar metrics at `step` (the 1-indexed epoch)
    fn log(&mut self, step: usize, metrics: &[(&str, f64)]) -> Result<()>;

    fn finish(&mut self, status: RunStatus) -> Result<()>;
}

/// Tracker that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn start_run(&mut self, _info: &RunInfo) -> Result<()> {
        Ok(())
    }

    fn log(&mut self, _step: usize, _metrics: &[(&str, f64)]) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _status: RunStatus) -> Result<()> {
        Ok(())
    }
}

/// Tracker keeping every event in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryTracker {
    pub run: Option<RunInfo>,
    pub metrics: Vec<(usize, String, f64)>,
    pub status: Option<RunStatus>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values logged under `name`, in order
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.metrics
            .iter()
            .filter(|(_, metric, _)| metric == name)
            .map(|(_, _, value)| *value)
            .collect()
    }
}

impl ExperimentTracker for MemoryTracker {
    fn start_run(&mut self, info: &RunInfo) -> Result<()> {
        if self.run.is_some() {
            return Err(UniTrainError::State("tracker run already started".into()));
        }
        self.run = Some(info.clone());
        Ok(())
    }

    fn log(&mut self, step: usize, metrics: &[(&str, f64)]) -> Result<()> {
        self.metrics.extend(
            metrics
                .iter()
                .map(|(name, value)| (step, name.to_string(), *value)),
        );
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> Result<()> {
        self.status = Some(status);
        Ok(())
    }
}

/// Tracker appending one JSON object per event to `{dir}/{run_name}.jsonl`
#[derive(Debug)]
pub struct JsonlTracker {
    dir: PathBuf,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl JsonlTracker {
    /// `dir` must already exist
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            path: None,
            writer: None,
        }
    }

    /// File of the current run, once started
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn write_line(&mut self, value: &Value) -> Result<()> {
        let path = self.path.clone().unwrap_or_else(|| self.dir.clone());
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| UniTrainError::State("tracker run has not been started".into()))?;
        serde_json::to_writer(&mut *writer, value)?;
        writeln!(writer).map_err(|e| UniTrainError::storage(&path, e))?;
        writer.flush().map_err(|e| UniTrainError::storage(&path, e))
    }
}

impl ExperimentTracker for JsonlTracker {
    fn start_run(&mut self, info: &RunInfo) -> Result<()> {
        let path = self.dir.join(format!("{}.jsonl", info.run_name));
        let file = File::create(&path).map_err(|e| UniTrainError::storage(&path, e))?;
        self.writer = Some(BufWriter::new(file));
        self.path = Some(path);

        self.write_line(&json!({
            "event": "start",
            "run": info.run_name,
            "params": info.params,
            "time": Local::now().to_rfc3339(),
        }))
    }

    fn log(&mut self, step: usize, metrics: &[(&str, f64)]) -> Result<()> {
        let mut record = Map::new();
        record.insert("step".into(), json!(step));
        for (name, value) in metrics {
            record.insert(name.to_string(), json!(value));
        }
        record.insert("time".into(), json!(Local::now().to_rfc3339()));
        self.write_line(&Value::Object(record))
    }

    fn finish(&mut self, status: RunStatus) -> Result<()> {
        self.write_line(&json!({
            "event": "finish",
            "status": status,
            "time": Local::now().to_rfc3339(),
        }))?;
        self.writer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_tracker_writes_one_object_per_event() {
        let tmp = TempDir::new().unwrap();
        let mut tracker = JsonlTracker::new(tmp.path());

        let info = RunInfo::new("run_test").with_param("epochs", 2);
        tracker.start_run(&info).unwrap();
        tracker.log(1, &[("val_accuracy", 50.0)]).unwrap();
        tracker.log(2, &[("val_accuracy", 75.0)]).unwrap();
        tracker.finish(RunStatus::Completed).unwrap();

        let content = std::fs::read_to_string(tmp.path().join("run_test.jsonl")).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["params"]["epochs"], "2");
        assert_eq!(lines[1]["val_accuracy"], 50.0);
        assert_eq!(lines[2]["step"], 2);
        assert_eq!(lines[3]["status"], "completed");
    }

    #[test]
    fn test_logging_before_start_is_a_state_error() {
        let tmp = TempDir::new().unwrap();
        let mut tracker = JsonlTracker::new(tmp.path());
        assert!(matches!(
            tracker.log(1, &[("val_accuracy", 1.0)]),
            Err(UniTrainError::State(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let mut tracker = JsonlTracker::new(tmp.path().join("absent"));
        assert!(matches!(
            tracker.start_run(&RunInfo::new("r")),
            Err(UniTrainError::Storage { .. })
        ));
    }

    #[test]
    fn test_memory_tracker_series() {
        let mut tracker = MemoryTracker::new();
        tracker.start_run(&RunInfo::timestamped()).unwrap();
        tracker.log(1, &[("val_accuracy", 10.0), ("loss", 2.0)]).unwrap();
        tracker.log(2, &[("val_accuracy", 20.0)]).unwrap();
        tracker.finish(RunStatus::Failed).unwrap();

        assert_eq!(tracker.series("val_accuracy"), vec![10.0, 20.0]);
        assert_eq!(tracker.status, Some(RunStatus::Failed));
        assert!(tracker.run.unwrap().run_name.starts_with("run_"));
    }
}
