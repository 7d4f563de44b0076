//! Backend selection
//!
//! NdArray on the CPU unless the crate is built with `--features cuda`.
//! Training always runs on the autodiff wrapper of the selected backend;
//! validation and inference use the bare backend.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

pub type TrainingBackend = Autodiff<DefaultBackend>;

pub type DefaultDevice = <DefaultBackend as Backend>::Device;

pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Seed parameter initialisation; the autodiff wrapper shares this RNG
pub fn seed_all(seed: u64) {
    DefaultBackend::seed(seed);
}

/// Human-readable backend name for CLI output
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}

