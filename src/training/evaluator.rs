//! Model evaluation
//!
//! Accuracy of a classifier over one full pass of a batch source. The model
//! is only borrowed; callers pass the inference-mode module obtained from
//! `AutodiffModule::valid`.

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{BatchSource, ClassificationBatch};
use crate::model::ImageClassifier;
use crate::utils::error::{Result, UniTrainError};

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub correct: usize,
    pub total: usize,
    /// Percentage in [0, 100]
    pub accuracy: f64,
}

/// Check that `logits` is `[targets.len(), num_classes]`
pub(crate) fn check_logits<B: Backend>(
    logits: &Tensor<B, 2>,
    targets: &Tensor<B, 1, Int>,
    num_classes: usize,
) -> Result<()> {
    let [rows, cols] = logits.dims();
    let [labels] = targets.dims();
    if rows != labels {
        return Err(UniTrainError::computation(format!(
            "logits have {} rows but the batch has {} labels",
            rows, labels
        )));
    }
    if cols != num_classes {
        return Err(UniTrainError::computation(format!(
            "logits have {} columns, expected {} classes",
            cols, num_classes
        )));
    }
    Ok(())
}

/// Number of rows whose arg-max matches the target
pub(crate) fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

/// Run `model` over every batch of `source` and count correct predictions
pub fn evaluate_detailed<B, M, S>(model: &M, source: &S) -> Result<EvaluationSummary>
where
    B: Backend,
    M: ImageClassifier<B>,
    S: BatchSource<ClassificationBatch<B>> + ?Sized,
{
    let num_classes = model.num_classes();
    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in source.batches() {
        let batch_size = batch.targets.dims()[0];
        if batch.images.dims()[0] != batch_size {
            return Err(UniTrainError::computation(format!(
                "batch has {} images but {} labels",
                batch.images.dims()[0],
                batch_size
            )));
        }
        if batch_size == 0 {
            continue;
        }

        let logits = model.forward(batch.images);
        check_logits(&logits, &batch.targets, num_classes)?;

        correct += count_correct(logits, batch.targets);
        total += batch_size;
    }

    if total == 0 {
        return Err(UniTrainError::Division(
            "evaluation source produced no examples".into(),
        ));
    }

    let accuracy = 100.0 * correct as f64 / total as f64;
    debug!("Evaluated {} examples: {} correct ({:.2}%)", total, correct, accuracy);

    Ok(EvaluationSummary {
        correct,
        total,
        accuracy,
    })
}

/// Accuracy in percent of `model` over `source`
///
/// Fails with [`UniTrainError::Division`] when the source is empty.
pub fn evaluate_model<B, M, S>(model: &M, source: &S) -> Result<f64>
where
    B: Backend,
    M: ImageClassifier<B>,
    S: BatchSource<ClassificationBatch<B>> + ?Sized,
{
    evaluate_detailed(model, source).map(|summary| summary.accuracy)
}
