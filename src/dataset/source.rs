//! Restartable batch sources
//!
//! The training engine and evaluator only need "iterate all batches once,
//! in order" and must be able to do it again next epoch. Burn data loaders
//! and in-memory batch lists both qualify.

use std::sync::Arc;

use burn::data::dataloader::DataLoader;

/// An ordered, finite sequence of batches that can be iterated repeatedly
pub trait BatchSource<O> {
    /// Start a fresh pass over the source
    fn batches(&self) -> Box<dyn Iterator<Item = O> + '_>;
}

impl<O: Clone> BatchSource<O> for Vec<O> {
    fn batches(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.iter().cloned())
    }
}

impl<O: Clone> BatchSource<O> for [O] {
    fn batches(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.iter().cloned())
    }
}

impl<O> BatchSource<O> for Arc<dyn DataLoader<O>> {
    fn batches(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.iter())
    }
}
