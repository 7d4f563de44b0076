//! Supervised training loop
//!
//! A hand-written epoch/batch loop over Burn's autodiff backend:
//!
//! ```text
//! Idle -> [Training -> Validating -> CheckpointDecision] x epochs -> Done
//!                         any unrecoverable error -> Failed
//! ```
//!
//! The engine takes the model by value for the whole run and hands it back in
//! [`TrainingOutcome`], so nothing else can touch it while it trains.

use std::path::PathBuf;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLoss,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::checkpoint::{best_checkpoint_path, save_weights, snapshot_path};
use super::config::TrainingConfig;
use super::evaluator::{check_logits, count_correct, evaluate_model};
use super::loss::{cross_entropy, LossFunction};
use super::run_log::RunLog;
use super::tracker::{ExperimentTracker, RunInfo, RunStatus};
use crate::dataset::{BatchSource, ClassificationBatch};
use crate::model::ImageClassifier;
use crate::utils::error::{Result, UniTrainError};

/// Where the engine currently is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Training { epoch: usize },
    Validating { epoch: usize },
    CheckpointDecision { epoch: usize },
    Done,
    Failed,
}

/// Running best validation accuracy
///
/// Starts at 0.0, so an epoch scoring exactly 0% never counts as an
/// improvement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestModelTracker {
    best: f64,
}

impl BestModelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `accuracy` strictly beats the best seen so far
    pub fn improves(&self, accuracy: f64) -> bool {
        accuracy > self.best
    }

    /// Record `accuracy` as the new best; ignored unless it improves
    pub fn accept(&mut self, accuracy: f64) {
        if self.improves(accuracy) {
            self.best = accuracy;
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

/// Everything a finished run produced besides the model itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Validation accuracy per epoch, in percent
    pub epoch_accuracies: Vec<f64>,
    /// Training accuracy per epoch, in percent
    pub train_accuracies: Vec<f64>,
    pub best_accuracy: f64,
    /// Periodic snapshots in the order they were written
    pub snapshots: Vec<PathBuf>,
    /// Best-model checkpoints in the order they were written
    pub best_checkpoints: Vec<PathBuf>,
}

/// Trained model plus its report
#[derive(Debug)]
pub struct TrainingOutcome<M> {
    pub model: M,
    pub report: TrainingReport,
}

/// Per-epoch training counters
#[derive(Debug, Default)]
struct EpochStats {
    rolling_loss: f64,
    correct: usize,
    seen: usize,
    batches: usize,
}

impl EpochStats {
    fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            100.0 * self.correct as f64 / self.seen as f64
        }
    }
}

/// Supervised trainer
pub struct Trainer<B: AutodiffBackend, L: LossFunction<B> = CrossEntropyLoss<B>> {
    config: TrainingConfig,
    device: B::Device,
    loss_fn: L,
    run_log: Option<RunLog>,
    run_info: RunInfo,
    phase: EnginePhase,
}

impl<B: AutodiffBackend> Trainer<B, CrossEntropyLoss<B>> {
    /// Trainer with cross-entropy loss
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        let loss_fn = cross_entropy::<B>(&device);
        Self::with_loss(config, device, loss_fn)
    }
}

impl<B: AutodiffBackend, L: LossFunction<B>> Trainer<B, L> {
    pub fn with_loss(config: TrainingConfig, device: B::Device, loss_fn: L) -> Result<Self> {
        config.validate()?;
        let run_info = RunInfo::timestamped()
            .with_param("num_epochs", config.num_epochs)
            .with_param("batch_size", config.batch_size)
            .with_param("learning_rate", config.learning_rate)
            .with_param("seed", config.seed);

        Ok(Self {
            config,
            device,
            loss_fn,
            run_log: None,
            run_info,
            phase: EnginePhase::Idle,
        })
    }

    /// Also write epoch and snapshot records to `run_log`
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Replace the timestamped run name; hyperparameters are kept
    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_info.run_name = run_name.into();
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Train `model` for the configured number of epochs
    ///
    /// The tracker sees `start_run`, one `val_accuracy` per epoch and a final
    /// `finish`, with [`RunStatus::Failed`] if any error aborted the run.
    pub fn fit<M, O, T, V>(
        &mut self,
        model: M,
        optimizer: O,
        train: &T,
        valid: &V,
        tracker: &mut dyn ExperimentTracker,
    ) -> Result<TrainingOutcome<M>>
    where
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        O: Optimizer<M, B>,
        T: BatchSource<ClassificationBatch<B>> + ?Sized,
        V: BatchSource<ClassificationBatch<B::InnerBackend>> + ?Sized,
    {
        if self.phase != EnginePhase::Idle {
            return Err(UniTrainError::State(format!(
                "trainer already used (phase {:?})",
                self.phase
            )));
        }

        let result = match tracker.start_run(&self.run_info) {
            Ok(()) => self.run_epochs(model, optimizer, train, valid, tracker),
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => {
                tracker.finish(RunStatus::Completed)?;
                self.phase = EnginePhase::Done;
                info!(
                    "Training complete. Best validation accuracy: {:.2}%",
                    outcome.report.best_accuracy
                );
                Ok(outcome)
            }
            Err(err) => {
                self.phase = EnginePhase::Failed;
                if let Err(finish_err) = tracker.finish(RunStatus::Failed) {
                    warn!("Could not close tracker run: {}", finish_err);
                }
                Err(err)
            }
        }
    }

    fn run_epochs<M, O, T, V>(
        &mut self,
        mut model: M,
        mut optimizer: O,
        train: &T,
        valid: &V,
        tracker: &mut dyn ExperimentTracker,
    ) -> Result<TrainingOutcome<M>>
    where
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        O: Optimizer<M, B>,
        T: BatchSource<ClassificationBatch<B>> + ?Sized,
        V: BatchSource<ClassificationBatch<B::InnerBackend>> + ?Sized,
    {
        let num_epochs = self.config.num_epochs;
        let interval = self.config.snapshot_interval;
        let mut best = BestModelTracker::new();
        let mut report = TrainingReport::default();
        let mut last_val_accuracy = 0.0;
        // survives epochs that write no snapshot of their own
        let mut latest_snapshot: Option<PathBuf> = None;

        for epoch in 1..=num_epochs {
            self.phase = EnginePhase::Training { epoch };
            info!("Epoch {}/{}", epoch, num_epochs);

            let mut stats = EpochStats::default();

            for (batch_index, batch) in train.batches().enumerate() {
                model = self.train_step(model, &mut optimizer, batch, &mut stats)?;

                if batch_index % interval == interval - 1 {
                    let mean_loss = stats.rolling_loss / interval as f64;
                    stats.rolling_loss = 0.0;

                    let path = snapshot_path(&self.config.snapshot_dir, epoch, batch_index + 1);
                    save_weights(&model, &path)?;

                    info!(
                        "Epoch {}, batch {}: loss = {:.4}",
                        epoch,
                        batch_index + 1,
                        mean_loss
                    );
                    self.log_record(
                        epoch,
                        stats.accuracy(),
                        last_val_accuracy,
                        &format!("Batch {} - Loss: {:.4}", batch_index + 1, mean_loss),
                    )?;

                    report.snapshots.push(path.clone());
                    latest_snapshot = Some(path);
                }
            }

            if stats.batches == 0 {
                warn!("Training source yielded no batches in epoch {}", epoch);
            }
            let train_accuracy = stats.accuracy();

            self.phase = EnginePhase::Validating { epoch };
            let accuracy = evaluate_model(&model.valid(), valid)?;
            last_val_accuracy = accuracy;
            report.epoch_accuracies.push(accuracy);
            report.train_accuracies.push(train_accuracy);

            info!(
                "Epoch {}: train accuracy = {:.2}%, validation accuracy = {:.2}%",
                epoch, train_accuracy, accuracy
            );
            tracker.log(epoch, &[("val_accuracy", accuracy)])?;
            let snapshot = latest_snapshot
                .as_ref()
                .map_or_else(|| "none".to_string(), |p| p.display().to_string());
            info!("Latest snapshot: {}", snapshot);
            self.log_record(
                epoch,
                train_accuracy,
                accuracy,
                &format!("Epoch complete - Latest snapshot: {}", snapshot),
            )?;

            self.phase = EnginePhase::CheckpointDecision { epoch };
            if best.improves(accuracy) {
                let path = best_checkpoint_path(&self.config.checkpoint_dir, epoch);
                save_weights(&model, &path)?;
                best.accept(accuracy);

                info!("New best model ({:.2}%) saved to {:?}", accuracy, path);
                self.log_record(
                    epoch,
                    train_accuracy,
                    accuracy,
                    &format!("Saved best model to {}", path.display()),
                )?;
                report.best_checkpoints.push(path);
            }
        }

        report.best_accuracy = best.best();
        Ok(TrainingOutcome { model, report })
    }

    /// Forward, loss, backward and one optimizer step on a single batch
    fn train_step<M, O>(
        &self,
        model: M,
        optimizer: &mut O,
        batch: ClassificationBatch<B>,
        stats: &mut EpochStats,
    ) -> Result<M>
    where
        M: AutodiffModule<B> + ImageClassifier<B>,
        O: Optimizer<M, B>,
    {
        let batch = batch.to_device(&self.device);
        let num_classes = model.num_classes();
        let [batch_size] = batch.targets.dims();

        if batch.images.dims()[0] != batch_size {
            return Err(UniTrainError::computation(format!(
                "batch has {} images but {} labels",
                batch.images.dims()[0],
                batch_size
            )));
        }
        if batch_size == 0 {
            return Err(UniTrainError::computation("empty training batch"));
        }

        let min_label: i64 = batch.targets.clone().min().into_scalar().elem();
        let max_label: i64 = batch.targets.clone().max().into_scalar().elem();
        if min_label < 0 || max_label >= num_classes as i64 {
            return Err(UniTrainError::computation(format!(
                "labels must lie in [0, {}), got range [{}, {}]",
                num_classes, min_label, max_label
            )));
        }

        let logits = model.forward(batch.images);
        check_logits(&logits, &batch.targets, num_classes)?;

        let loss = self.loss_fn.loss(logits.clone(), batch.targets.clone());
        let loss_value: f64 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(UniTrainError::computation(format!(
                "non-finite loss {}",
                loss_value
            )));
        }

        stats.correct += count_correct(logits.detach(), batch.targets);
        stats.seen += batch_size;
        stats.batches += 1;
        stats.rolling_loss += loss_value;

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        debug!("Batch {}: loss = {:.4}", stats.batches, loss_value);

        Ok(optimizer.step(self.config.learning_rate, model, grads))
    }

    fn log_record(
        &mut self,
        epoch: usize,
        train_accuracy: f64,
        val_accuracy: f64,
        message: &str,
    ) -> Result<()> {
        match self.run_log.as_mut() {
            Some(log) => log.record(epoch, train_accuracy, val_accuracy, message),
            None => Ok(()),
        }
    }
}
