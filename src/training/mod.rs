//! Training
//!
//! - [`engine`]: epoch/batch loop with snapshots and best-model checkpoints
//! - [`evaluator`]: accuracy over a batch source
//! - [`checkpoint`]: parameter snapshots on disk
//! - [`tracker`] and [`run_log`]: where per-run metrics go

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod loss;
pub mod run_log;
pub mod tracker;

pub use checkpoint::{
    best_checkpoint_path, latest_best_checkpoint, load_weights, parse_checkpoint_name,
    save_weights, snapshot_path, CheckpointKind,
};
pub use config::TrainingConfig;
pub use engine::{BestModelTracker, EnginePhase, Trainer, TrainingOutcome, TrainingReport};
pub use evaluator::{evaluate_detailed, evaluate_model, EvaluationSummary};
pub use loss::{cross_entropy, LossFunction};
pub use run_log::RunLog;
pub use tracker::{ExperimentTracker, JsonlTracker, MemoryTracker, NoopTracker, RunInfo, RunStatus};
