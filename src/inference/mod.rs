//! Inference
//!
//! Single-image prediction against a loaded classifier, with labels taken
//! from the class directories of a training root.

pub mod predictor;

pub use predictor::{Prediction, Predictor, DEFAULT_CLASS_ROOT};
